use super::*;

/// ANSI escape sequences, NULs and carriage returns some devices prepend to lines.
static LINE_NOISE: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b[()][A-Za-z0-9]|\x00|\r|\u{8}") {
        Ok(re) => re,
        Err(err) => panic!("invalid LINE_NOISE regex: {err}"),
    }
});

/// Dialect patterns compiled once per session.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    prompts: RegexSet,
    errors: RegexSet,
    more: RegexSet,
    confirmations: Vec<(Regex, String)>,
}

impl PromptMatcher {
    pub fn new(dialect: &Dialect) -> Result<Self, ConnectError> {
        let compile_set = |kind: &str, patterns: &[String]| {
            RegexSet::new(patterns).map_err(|err| {
                ConnectError::InvalidDialect(format!(
                    "{} {kind} patterns: {err}",
                    dialect.family
                ))
            })
        };
        let confirmations = dialect
            .confirmations
            .iter()
            .map(|c| {
                Regex::new(&c.pattern)
                    .map(|re| (re, c.answer.clone()))
                    .map_err(|err| {
                        ConnectError::InvalidDialect(format!(
                            "{} confirmation pattern: {err}",
                            dialect.family
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            prompts: compile_set("prompt", &dialect.prompt_patterns)?,
            errors: compile_set("error", &dialect.error_patterns)?,
            more: compile_set("more", &dialect.more_patterns)?,
            confirmations,
        })
    }

    /// Strips terminal noise from a line.
    pub fn clean(line: &str) -> Cow<'_, str> {
        LINE_NOISE.replace_all(line, "")
    }

    pub fn is_prompt(&self, line: &str) -> bool {
        self.prompts.is_match(Self::clean(line).trim_end_matches('\n'))
    }

    pub fn is_error(&self, line: &str) -> bool {
        self.errors.is_match(Self::clean(line).trim())
    }

    pub fn is_more(&self, text: &str) -> bool {
        self.more.is_match(&Self::clean(text))
    }

    /// Answer for an interactive question at the end of `text`, if any.
    pub fn confirmation(&self, text: &str) -> Option<&str> {
        let cleaned = Self::clean(text);
        self.confirmations
            .iter()
            .find(|(re, _)| re.is_match(&cleaned))
            .map(|(_, answer)| answer.as_str())
    }
}
