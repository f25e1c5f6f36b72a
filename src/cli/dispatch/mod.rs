use crate::cli::{
    actions::{issue, server, Action},
    globals::GlobalArgs,
};
use crate::token::{Scope, DEFAULT_MAX_TTL_SECONDS};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

fn globals(matches: &clap::ArgMatches) -> GlobalArgs {
    GlobalArgs {
        signing_secret: matches
            .get_one::<String>("signing-secret")
            .cloned()
            .map(SecretString::from),
        signing_secret_file: matches
            .get_one::<String>("signing-secret-file")
            .map(PathBuf::from),
        max_ttl_seconds: matches
            .get_one::<i64>("max-ttl-seconds")
            .copied()
            .unwrap_or(DEFAULT_MAX_TTL_SECONDS),
    }
}

fn required_string(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn required_url(matches: &clap::ArgMatches, name: &str) -> Result<Url> {
    let raw = required_string(matches, name)?;
    Url::parse(&raw).with_context(|| format!("invalid --{name}: {raw}"))
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("server", sub_m)) => {
            let globals = globals(sub_m);
            // Fail before binding anything if the key source is misconfigured.
            globals.secret_provider()?;

            Ok(Action::Server(server::Args {
                port: sub_m.get_one::<u16>("port").copied().unwrap_or(8080),
                dsn: required_string(sub_m, "dsn")?,
                frontend_base_url: required_url(sub_m, "frontend-base-url")?,
                globals,
            }))
        }
        Some(("issue", sub_m)) => {
            let globals = globals(sub_m);
            globals.secret_provider()?;

            let scope = required_string(sub_m, "scope")?
                .parse::<Scope>()
                .context("invalid --scope")?;

            Ok(Action::Issue(issue::Args {
                dsn: required_string(sub_m, "dsn")?,
                subject: required_string(sub_m, "subject")?,
                scope,
                ttl_seconds: sub_m.get_one::<i64>("ttl-seconds").copied().unwrap_or(86_400),
                link_base_url: required_url(sub_m, "link-base-url")?,
                globals,
            }))
        }
        Some((name, _)) => Err(anyhow!("unknown subcommand: {name}")),
        None => Err(anyhow!("missing subcommand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_server_action() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "onboard",
            "server",
            "--port",
            "9090",
            "--dsn",
            "postgres://localhost/onboard",
            "--frontend-base-url",
            "https://app.onboard.dev",
            "--signing-secret",
            SECRET,
            "--max-ttl-seconds",
            "3600",
        ])?;

        match handler(&matches)? {
            Action::Server(args) => {
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost/onboard");
                assert_eq!(args.frontend_base_url.as_str(), "https://app.onboard.dev/");
                assert_eq!(args.globals.max_ttl_seconds, 3600);
            }
            Action::Issue(_) => return Err(anyhow!("expected server action")),
        }
        Ok(())
    }

    #[test]
    fn test_issue_action() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "onboard",
            "issue",
            "--dsn",
            "postgres://localhost/onboard",
            "--subject",
            "practice-42",
            "--scope",
            "settings_update",
            "--link-base-url",
            "https://api.onboard.dev",
            "--signing-secret",
            SECRET,
        ])?;

        match handler(&matches)? {
            Action::Issue(args) => {
                assert_eq!(args.subject, "practice-42");
                assert_eq!(args.scope, Scope::SettingsUpdate);
                assert_eq!(args.link_base_url.as_str(), "https://api.onboard.dev/");
            }
            Action::Server(_) => return Err(anyhow!("expected issue action")),
        }
        Ok(())
    }

    #[test]
    fn test_missing_secret() -> Result<()> {
        temp_env::with_vars_unset(
            ["ONBOARD_SIGNING_SECRET", "ONBOARD_SIGNING_SECRET_FILE"],
            || -> Result<()> {
                let matches = commands::new().try_get_matches_from(vec![
                    "onboard",
                    "server",
                    "--dsn",
                    "postgres://localhost/onboard",
                    "--frontend-base-url",
                    "https://app.onboard.dev",
                ])?;
                assert!(handler(&matches).is_err());
                Ok(())
            },
        )
    }

    #[test]
    fn test_invalid_frontend_url() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "onboard",
            "server",
            "--dsn",
            "postgres://localhost/onboard",
            "--frontend-base-url",
            "not a url",
            "--signing-secret",
            SECRET,
        ])?;
        assert!(handler(&matches).is_err());
        Ok(())
    }
}
