/// One build-file instruction.
///
/// `value` never contains flags; exec-form arguments keep one element per
/// JSON array entry and `is_json` records that they came from that form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instruction {
    pub cmd: String,
    pub sub_cmd: Option<String>,
    pub is_json: bool,
    pub original: String,
    pub start_line: usize,
    pub flags: Vec<String>,
    pub value: Vec<String>,
}

impl Instruction {
    /// Builds an instruction from a hand-written line, keeping everything after
    /// the keyword as a single verbatim argument.
    pub fn from_line(line: &str, start_line: usize) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (keyword, rest) = match trimmed.find(char::is_whitespace) {
            Some(pos) => (&trimmed[..pos], trimmed[pos..].trim_start()),
            None => (trimmed, ""),
        };

        let value = if rest.is_empty() {
            Vec::new()
        } else {
            vec![rest.to_string()]
        };

        Some(Self {
            cmd: keyword.to_ascii_lowercase(),
            original: line.to_string(),
            start_line,
            value,
            ..Self::default()
        })
    }

    pub fn is_from(&self) -> bool {
        self.cmd == "from"
    }

    /// Canonical single-line form: keyword, nested keyword, flags, arguments.
    pub fn render(&self) -> String {
        let mut parts = vec![self.cmd.to_ascii_uppercase()];
        if let Some(sub_cmd) = &self.sub_cmd {
            parts.push(sub_cmd.to_ascii_uppercase());
        }
        parts.extend(self.flags.iter().cloned());

        if self.is_json {
            parts.push(serde_json::Value::from(self.value.clone()).to_string());
        } else {
            parts.extend(self.value.iter().filter(|v| !v.is_empty()).cloned());
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Instruction;

    #[test]
    fn from_line_keeps_arguments_verbatim() {
        let instruction =
            Instruction::from_line("run  apk add  curl", 4).expect("line should map");
        assert_eq!(instruction.cmd, "run");
        assert_eq!(instruction.value, vec!["apk add  curl".to_string()]);
        assert_eq!(instruction.render(), "RUN apk add  curl");
        assert_eq!(instruction.start_line, 4);
    }

    #[test]
    fn blank_lines_are_not_instructions() {
        assert!(Instruction::from_line("   ", 1).is_none());
    }

    #[test]
    fn renders_exec_form_and_flags() {
        let instruction = Instruction {
            cmd: "copy".to_string(),
            flags: vec!["--from=build".to_string()],
            value: vec!["/out".to_string(), "/app".to_string()],
            ..Instruction::default()
        };
        assert_eq!(instruction.render(), "COPY --from=build /out /app");

        let exec = Instruction {
            cmd: "cmd".to_string(),
            is_json: true,
            value: vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()],
            ..Instruction::default()
        };
        assert_eq!(exec.render(), r#"CMD ["sh","-c","echo hi"]"#);
    }

    #[test]
    fn renders_onbuild_nested_keyword() {
        let instruction = Instruction {
            cmd: "onbuild".to_string(),
            sub_cmd: Some("run".to_string()),
            value: vec!["make".to_string()],
            ..Instruction::default()
        };
        assert_eq!(instruction.render(), "ONBUILD RUN make");
    }
}
