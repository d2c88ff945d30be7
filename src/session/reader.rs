use super::*;

/// What the shell loop does after feeding a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadAction {
    /// Keep reading.
    Continue,
    /// Write this to the shell, then keep reading.
    Send(String),
    /// The buffered tail is a prompt; the exchange is complete.
    Prompt(String),
}

/// Splits raw shell output into clean lines until the dialect prompt shows up.
///
/// Pagination markers ask for a space and dialect confirmations for their
/// configured answer. Neither the marker nor the prompt ends up in the lines.
#[derive(Debug, Default)]
pub struct ShellReader {
    lines: Vec<String>,
    partial: String,
}

impl ShellReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, matcher: &PromptMatcher, chunk: &str) -> ReadAction {
        self.partial.push_str(chunk);

        while let Some(newline_pos) = self.partial.find('\n') {
            let line = self.partial.drain(..=newline_pos).collect::<String>();
            self.lines
                .push(PromptMatcher::clean(&line).trim_end().to_string());
        }

        if self.partial.is_empty() {
            return ReadAction::Continue;
        }
        if matcher.is_prompt(&self.partial) {
            let prompt = PromptMatcher::clean(&self.partial).trim().to_string();
            self.partial.clear();
            return ReadAction::Prompt(prompt);
        }
        if matcher.is_more(&self.partial) {
            self.partial.clear();
            return ReadAction::Send(" ".to_string());
        }
        if let Some(answer) = matcher.confirmation(&self.partial) {
            let question = PromptMatcher::clean(&self.partial).trim_end().to_string();
            self.lines.push(question);
            self.partial.clear();
            return ReadAction::Send(answer.to_string());
        }
        ReadAction::Continue
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Everything received so far, including an unterminated tail.
    pub fn into_partial_output(mut self) -> String {
        if !self.partial.is_empty() {
            let tail = PromptMatcher::clean(&self.partial).trim_end().to_string();
            self.lines.push(tail);
        }
        self.lines.join("\n")
    }
}

/// Builds the step for `input` from the lines read before the prompt.
///
/// A first line ending in the input is the echo and is dropped. The step fails
/// when any remaining line matches a dialect error pattern.
pub fn step_result(matcher: &PromptMatcher, input: &str, mut lines: Vec<String>) -> StepResult {
    let echoed = lines
        .first()
        .is_some_and(|first| !input.trim().is_empty() && first.trim_end().ends_with(input.trim()));
    if echoed {
        lines.remove(0);
    }

    let failed = lines.iter().any(|line| matcher.is_error(line));
    StepResult {
        input: input.to_string(),
        output: lines.join("\n").trim_end().to_string(),
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;

    fn read_all(matcher: &PromptMatcher, chunks: &[&str]) -> (ShellReader, Vec<ReadAction>) {
        let mut reader = ShellReader::new();
        let actions = chunks
            .iter()
            .map(|chunk| reader.feed(matcher, chunk))
            .collect();
        (reader, actions)
    }

    #[test]
    fn ios_command_output_is_split_at_prompt() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &["show clock\r\n", "*10:00:00.000 UTC Mon Oct 12 2026\r\nr1#"],
        );

        assert_eq!(
            actions,
            vec![ReadAction::Continue, ReadAction::Prompt("r1#".to_string())]
        );
        let step = step_result(&matcher, "show clock", reader.into_lines());
        assert_eq!(step, StepResult::ok("show clock", "*10:00:00.000 UTC Mon Oct 12 2026"));
    }

    #[test]
    fn prompt_split_across_chunks_is_found_once_complete() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &["show ver", "sion\r\nCisco IOS", " Software\r\nr1", "#"],
        );

        assert_eq!(actions[..3], [ReadAction::Continue, ReadAction::Continue, ReadAction::Continue]);
        assert_eq!(actions[3], ReadAction::Prompt("r1#".to_string()));
        assert_eq!(reader.lines(), ["show version", "Cisco IOS Software"]);
    }

    #[test]
    fn more_marker_is_answered_and_dropped() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &["show running-config\r\nhostname r1\r\n --More-- ", "\r\nline vty 0 4\r\nr1#"],
        );

        assert_eq!(actions[0], ReadAction::Send(" ".to_string()));
        assert!(matches!(actions[1], ReadAction::Prompt(_)));
        let step = step_result(&matcher, "show running-config", reader.into_lines());
        assert_eq!(step.output, "hostname r1\n\nline vty 0 4");
        assert!(!step.output.contains("More"));
    }

    #[test]
    fn rejected_ios_statement_is_flagged() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &[
                " switchport mode trunk\r\n",
                "                         ^\r\n% Invalid input detected at '^' marker.\r\n\r\n",
                "r1(config-if)#",
            ],
        );

        assert_eq!(actions[2], ReadAction::Prompt("r1(config-if)#".to_string()));
        let step = step_result(&matcher, " switchport mode trunk", reader.into_lines());
        assert!(step.failed);
        assert!(step.output.ends_with("% Invalid input detected at '^' marker."));
        assert!(!step.output.contains("switchport"));
    }

    #[test]
    fn ios_save_confirmation_is_answered() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &[
                "copy running-config startup-config\r\nDestination filename [startup-config]? ",
                "\r\nBuilding configuration...\r\n[OK]\r\nr1#",
            ],
        );

        assert_eq!(actions[0], ReadAction::Send("\n".to_string()));
        assert!(matches!(actions[1], ReadAction::Prompt(_)));
        let step = step_result(&matcher, "copy running-config startup-config", reader.into_lines());
        assert!(!step.failed);
        assert!(step.output.starts_with("Destination filename [startup-config]?"));
        assert!(step.output.ends_with("[OK]"));
    }

    #[test]
    fn junos_echo_after_prompt_is_stripped() {
        let matcher = PromptMatcher::new(&templates::junos()).expect("junos matcher");
        let (reader, actions) = read_all(
            &matcher,
            &[
                "admin@mx1> show interfaces terse ge-0/0/0\r\n",
                "Interface               Admin Link Proto\r\nge-0/0/0                up    up\r\n\r\n",
                "admin@mx1> ",
            ],
        );

        assert_eq!(actions[2], ReadAction::Prompt("admin@mx1>".to_string()));
        let step = step_result(&matcher, "show interfaces terse ge-0/0/0", reader.into_lines());
        assert!(!step.failed);
        assert!(step.output.starts_with("Interface"));
        assert!(step.output.ends_with("up    up"));
    }

    #[test]
    fn junos_error_and_pagination() {
        let matcher = PromptMatcher::new(&templates::junos()).expect("junos matcher");
        let (reader, actions) = read_all(
            &matcher,
            &[
                "admin@mx1# set interfaces ge-0/0/0 mtu 99999\r\n",
                "---(more)---",
                "error: value 99999 is not within range (256..9500)\r\n\r\n[edit]\r\nadmin@mx1# ",
            ],
        );

        assert_eq!(actions[1], ReadAction::Send(" ".to_string()));
        assert_eq!(actions[2], ReadAction::Prompt("admin@mx1#".to_string()));
        let step = step_result(&matcher, "set interfaces ge-0/0/0 mtu 99999", reader.into_lines());
        assert!(step.failed);
        assert!(step.output.starts_with("error: value 99999"));
    }

    #[test]
    fn junos_uncommitted_exit_is_confirmed() {
        let matcher = PromptMatcher::new(&templates::junos()).expect("junos matcher");
        let mut reader = ShellReader::new();

        let action = reader.feed(
            &matcher,
            "admin@mx1# exit configuration-mode\r\nExit with uncommitted changes? [yes,no] (yes) ",
        );

        assert_eq!(action, ReadAction::Send("yes\n".to_string()));
        assert_eq!(
            reader.feed(&matcher, "\r\nExiting configuration mode\r\n\r\nadmin@mx1> "),
            ReadAction::Prompt("admin@mx1>".to_string())
        );
    }

    #[test]
    fn partial_output_keeps_unterminated_tail() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let (reader, actions) = read_all(
            &matcher,
            &["show tech-support\r\n------- show version -------\r\n", "Cisco IOS"],
        );

        assert!(actions.iter().all(|a| *a == ReadAction::Continue));
        assert_eq!(
            reader.into_partial_output(),
            "show tech-support\n------- show version -------\nCisco IOS"
        );
    }

    #[test]
    fn output_without_echo_is_kept_whole() {
        let matcher = PromptMatcher::new(&templates::ios()).expect("ios matcher");
        let step = step_result(
            &matcher,
            "show clock",
            vec!["*10:00:00.000 UTC".to_string()],
        );
        assert_eq!(step.output, "*10:00:00.000 UTC");

        let empty = step_result(&matcher, "show clock", vec!["show clock".to_string()]);
        assert_eq!(empty.output, "");
        assert!(!empty.failed);
    }
}
