use std::path::PathBuf;

use clap::Parser;
use osverify_db::AccountFiles;

/// Orchestrates external account verification jobs and records each
/// account as verified or blocked.
///
/// Pass either no file arguments (defaults: complete.csv verify.csv
/// block.csv) or all three.
#[derive(Debug, Parser)]
#[command(name = "osverify-worker", version)]
pub struct Cli {
    /// Source file of accounts awaiting verification.
    #[arg(requires = "verified")]
    pub source: Option<PathBuf>,

    /// Append-only file of verified accounts.
    #[arg(requires = "blocked")]
    pub verified: Option<PathBuf>,

    /// Append-only file of blocked accounts.
    pub blocked: Option<PathBuf>,
}

impl Cli {
    pub fn account_files(&self) -> AccountFiles {
        match (&self.source, &self.verified, &self.blocked) {
            (Some(source), Some(verified), Some(blocked)) => {
                AccountFiles::new(source, verified, blocked)
            }
            _ => AccountFiles::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_select_default_files() {
        let cli = Cli::try_parse_from(["osverify-worker"]).unwrap();
        assert_eq!(cli.account_files(), AccountFiles::default());
        assert_eq!(cli.account_files().source, PathBuf::from("complete.csv"));
    }

    #[test]
    fn three_arguments_select_given_files() {
        let cli = Cli::try_parse_from(["osverify-worker", "in.csv", "ok.csv", "bad.csv"]).unwrap();
        assert_eq!(
            cli.account_files(),
            AccountFiles::new("in.csv", "ok.csv", "bad.csv")
        );
    }

    #[test]
    fn one_or_two_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["osverify-worker", "in.csv"]).is_err());
        assert!(Cli::try_parse_from(["osverify-worker", "in.csv", "ok.csv"]).is_err());
    }

    #[test]
    fn four_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["osverify-worker", "a", "b", "c", "d"]).is_err());
    }

    #[test]
    fn command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
