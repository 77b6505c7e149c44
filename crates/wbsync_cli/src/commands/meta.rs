use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;

use crate::Cli;

const BIN_NAME: &str = "wbsync";

fn completion_script(shell: clap_complete::Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
    out
}

fn main_man_page() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    clap_mangen::Man::new(Cli::command()).render(&mut out)?;
    Ok(out)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<(), Box<dyn std::error::Error>> {
    std::io::stdout().write_all(&completion_script(shell))?;
    Ok(())
}

/// Print the main page, or write one page per subcommand into `output`.
pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            clap_mangen::generate_to(Cli::command(), &dir)?;
            println!("Generated man pages in: {}", dir.display());
        }
        None => std::io::stdout().write_all(&main_man_page()?)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn completion_script_lists_operations() {
        let script = String::from_utf8(completion_script(clap_complete::Shell::Bash)).unwrap();
        assert!(script.contains(BIN_NAME));
        for operation in ["rename", "brand", "package", "media", "create"] {
            assert!(script.contains(operation), "missing {operation}");
        }
    }

    #[test]
    fn main_man_page_has_title() {
        let page = String::from_utf8(main_man_page().unwrap()).unwrap();
        assert!(page.to_lowercase().contains(".th wbsync"));
    }

    #[test]
    fn handle_man_writes_pages_per_subcommand() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("wbsync-man-{nonce}"));

        handle_man(Some(dir.clone())).unwrap();

        let pages: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(pages.iter().any(|p| p == "wbsync.1"));
        assert!(pages.iter().any(|p| p.contains("rename")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
