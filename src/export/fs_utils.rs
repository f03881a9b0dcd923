use crate::errors::{AppError, AppResult};
use crate::ui::messages::{info, warning};
use std::io::{self, BufRead, Write};
use std::path::Path;

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Ok when `path` is free, `force` is set, or the operator agrees to
/// overwrite it.
pub(crate) fn ensure_writable(path: &Path, force: bool) -> AppResult<()> {
    if force || !path.exists() {
        return Ok(());
    }

    warning(format!("'{}' already exists.", path.display()));
    print!("Overwrite? [y/N]: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    if confirmed(&answer) {
        info("Overwriting existing file.");
        Ok(())
    } else {
        Err(AppError::Other(format!(
            "export cancelled, '{}' left untouched",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(confirmed("y\n"));
        assert!(confirmed(" YES "));
        assert!(!confirmed("\n"));
        assert!(!confirmed("no"));
    }

    #[test]
    fn missing_file_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_writable(&dir.path().join("out.csv"), false).is_ok());
    }
}
