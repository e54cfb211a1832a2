use crate::error::{HistoryError, Result};
use crate::model::{CommitInfo, Person};
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// `git show` placeholders, one per line, message last since it may span
/// several lines.
const GIT_FORMAT: &str = "--format=%H%n%T%n%an%n%ae%n%cn%n%ce%n%cI%n%B";

impl CommitInfo {
    /// Reads commit `rev` of the repository at `repo_dir`.
    pub fn from_git(repo_dir: &Path, rev: &str, repo_url: &str) -> Result<Self> {
        let output = Command::new("git")
            .current_dir(repo_dir)
            .args(["show", "-s", GIT_FORMAT, rev, "--"])
            .output()
            .map_err(|e| HistoryError::Git(format!("spawn git: {e}")))?;

        if !output.status.success() {
            return Err(HistoryError::Git(format!(
                "git show {rev} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("git show {} returned {} bytes", rev, stdout.len());

        parse_git_show(&stdout, repo_url)
    }

    /// Reads the pushed head commit from a GitHub event payload.
    pub fn from_github_event(event: &Value) -> Result<Self> {
        let head = event
            .get("head_commit")
            .filter(|v| v.is_object())
            .ok_or_else(|| HistoryError::parse("github event", "missing head_commit"))?;

        Ok(serde_json::from_value(head.clone())?)
    }
}

fn parse_git_show(stdout: &str, repo_url: &str) -> Result<CommitInfo> {
    let mut lines = stdout.splitn(8, '\n');
    let mut next = |what: &'static str| {
        lines
            .next()
            .map(str::to_string)
            .ok_or_else(|| HistoryError::Git(format!("git output is missing the {what}")))
    };

    let id = next("commit id")?;
    let tree_id = next("tree id")?;
    let author_name = next("author name")?;
    let author_email = next("author email")?;
    let committer_name = next("committer name")?;
    let committer_email = next("committer email")?;
    let timestamp = next("commit date")?;
    let message = next("message").unwrap_or_default().trim_end().to_string();

    if id.is_empty() {
        return Err(HistoryError::Git("git output is missing the commit id".to_string()));
    }

    Ok(CommitInfo {
        author: Person {
            email: author_email,
            name: author_name,
            username: None,
        },
        committer: Person {
            email: committer_email,
            name: committer_name,
            username: None,
        },
        distinct: true,
        url: format!("{}/commit/{}", repo_url.trim_end_matches('/'), id),
        id,
        message,
        timestamp,
        tree_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_git_show_output() {
        let stdout = "0123abcd\nfeed\nAda\nada@example.com\nGitHub\nnoreply@github.com\n2024-05-01T12:00:00+02:00\nSpeed up scans\n\nBody line\n\n";
        let commit = parse_git_show(stdout, "https://github.com/owner/repo/").unwrap();

        assert_eq!(commit.id, "0123abcd");
        assert_eq!(commit.tree_id, "feed");
        assert_eq!(commit.author.name, "Ada");
        assert_eq!(commit.committer.email, "noreply@github.com");
        assert_eq!(commit.timestamp, "2024-05-01T12:00:00+02:00");
        assert_eq!(commit.message, "Speed up scans\n\nBody line");
        assert_eq!(commit.url, "https://github.com/owner/repo/commit/0123abcd");
        assert!(commit.distinct);
    }

    #[test]
    fn truncated_git_output_is_an_error() {
        assert!(matches!(
            parse_git_show("0123abcd\nfeed\n", "https://x"),
            Err(HistoryError::Git(_))
        ));
    }

    #[test]
    fn reads_head_commit_from_push_event() {
        let event = json!({
            "ref": "refs/heads/main",
            "head_commit": {
                "author": {"email": "a@example.com", "name": "A", "username": "a"},
                "committer": {"email": "c@example.com", "name": "C", "username": "c"},
                "distinct": true,
                "id": "abc123",
                "message": "Add persist benchmark",
                "timestamp": "2022-02-01T00:00:00Z",
                "tree_id": "def456",
                "url": "https://github.com/owner/repo/commit/abc123"
            }
        });

        let commit = CommitInfo::from_github_event(&event).unwrap();
        assert_eq!(commit.id, "abc123");
        assert_eq!(commit.author.username.as_deref(), Some("a"));

        assert!(CommitInfo::from_github_event(&json!({"pull_request": {}})).is_err());
    }
}
