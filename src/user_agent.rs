//! User-agent pool: a list file, one string per line, with a random pick
//! per request. Lines starting with `#` or `;` are comments; blank lines
//! and CRLF endings are tolerated. An empty pool is a startup error.

use std::path::Path;

use rand::Rng;

use crate::error_handling::StartupError;

pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StartupError::UserAgentList(format!("{}: {e}", path.display())))?;

        let agents: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r').trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
            .map(str::to_string)
            .collect();

        if agents.is_empty() {
            return Err(StartupError::UserAgentList(format!(
                "no user-agent strings in {}",
                path.display()
            )));
        }
        Ok(Self { agents })
    }

    /// A uniformly random entry.
    pub fn pick(&self) -> &str {
        let i = rand::thread_rng().gen_range(0..self.agents.len());
        &self.agents[i]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_list(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_entries_and_skips_comments() {
        let f = write_list("# browsers\nMozilla/5.0 A\r\n; old ones\n\nMozilla/5.0 B\n");
        let pool = UserAgentPool::load(f.path()).unwrap();
        assert_eq!(pool.len(), 2);
        let ua = pool.pick();
        assert!(ua == "Mozilla/5.0 A" || ua == "Mozilla/5.0 B");
    }

    #[test]
    fn empty_list_is_a_startup_error() {
        let f = write_list("# nothing but comments\n;\n");
        assert!(matches!(
            UserAgentPool::load(f.path()),
            Err(StartupError::UserAgentList(_))
        ));
    }

    #[test]
    fn missing_file_is_a_startup_error() {
        assert!(UserAgentPool::load(Path::new("/nonexistent/ua.txt")).is_err());
    }
}
