// src/system/expansion.rs

//! Word expansion: turns the program-plus-arguments text of a command into the
//! argument vector handed to the new process image.

use std::env::VarError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("unbalanced quotes or trailing escape")]
    Unbalanced,
    #[error("no words after expansion")]
    Empty,
    #[error("{0}")]
    Variable(#[from] shellexpand::LookupError<VarError>),
}

/// Expands one command text into words. The first word is the program.
pub trait WordExpander: Send + Sync {
    fn expand(&self, command_line: &str) -> Result<Vec<String>, ExpansionError>;
}

/// POSIX-like splitting with quotes and escapes, then `~` and `$VAR`/`${VAR}`
/// expansion of every word.
///
/// Undefined variables are an error rather than silently empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellWordExpander;

impl WordExpander for ShellWordExpander {
    fn expand(&self, command_line: &str) -> Result<Vec<String>, ExpansionError> {
        // shlex splits on space, tab and LF; CR separates words in the grammar too.
        let command_line = command_line.replace('\r', " ");
        let words = shlex::split(&command_line).ok_or(ExpansionError::Unbalanced)?;
        let expanded = words
            .iter()
            .map(|word| shellexpand::full(word).map(|w| w.into_owned()))
            .collect::<Result<Vec<_>, _>>()?;

        if expanded.is_empty() {
            return Err(ExpansionError::Empty);
        }
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_are_split_on_whitespace() {
        let words = ShellWordExpander.expand("ls  -la\t/tmp").unwrap();
        assert_eq!(words, vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn test_only_ascii_blanks_split_words() {
        let words = ShellWordExpander.expand("ls\r-l").unwrap();
        assert_eq!(words, vec!["ls", "-l"]);

        let words = ShellWordExpander.expand("echo\u{a0}hi").unwrap();
        assert_eq!(words, vec!["echo\u{a0}hi"]);
    }

    #[test]
    fn test_quotes_group_words() {
        let words = ShellWordExpander.expand(r#"echo "a b" 'c d' e\ f"#).unwrap();
        assert_eq!(words, vec!["echo", "a b", "c d", "e f"]);
    }

    #[test]
    fn test_home_and_variables_are_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let words = ShellWordExpander.expand("ls ~/docs").unwrap();
        assert_eq!(words, vec!["ls".to_string(), format!("{}/docs", home.display())]);

        let path = std::env::var("PATH").unwrap_or_default();
        if !path.is_empty() {
            let words = ShellWordExpander.expand("echo $PATH").unwrap();
            assert_eq!(words, vec!["echo".to_string(), path]);
        }
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let result = ShellWordExpander.expand("echo $TANDEM_SURELY_UNDEFINED_VARIABLE");
        assert!(matches!(result, Err(ExpansionError::Variable(_))));
    }

    #[test]
    fn test_unbalanced_quote_is_an_error() {
        assert!(matches!(
            ShellWordExpander.expand("echo 'oops"),
            Err(ExpansionError::Unbalanced)
        ));
    }
}
