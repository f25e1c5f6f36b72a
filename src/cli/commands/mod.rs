use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

fn dsn_arg() -> Arg {
    Arg::new("dsn")
        .short('d')
        .long("dsn")
        .help("Database connection string")
        .env("ONBOARD_DSN")
        .required(true)
}

fn server_command() -> Command {
    Command::new("server")
        .about("Serve the onboarding link endpoints")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("ONBOARD_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(dsn_arg())
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for redirects and CORS, example: https://app.onboard.dev")
                .env("ONBOARD_FRONTEND_BASE_URL")
                .required(true),
        )
}

fn issue_command() -> Command {
    Command::new("issue")
        .about("Mint a single-use link and record it")
        .arg(dsn_arg())
        .arg(
            Arg::new("subject")
                .short('s')
                .long("subject")
                .help("Subject (practice) id the link is bound to")
                .env("ONBOARD_SUBJECT")
                .required(true),
        )
        .arg(
            Arg::new("scope")
                .long("scope")
                .help("Link scope")
                .default_value("onboarding")
                .env("ONBOARD_SCOPE")
                .value_parser(["onboarding", "settings_update"]),
        )
        .arg(
            Arg::new("ttl-seconds")
                .long("ttl-seconds")
                .help("Link lifetime in seconds")
                .default_value("86400")
                .env("ONBOARD_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("link-base-url")
                .long("link-base-url")
                .help("Public base URL of the link endpoints, example: https://api.onboard.dev")
                .env("ONBOARD_LINK_BASE_URL")
                .required(true),
        )
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("onboard")
        .about("Single-use signed links for practice onboarding")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("signing-secret")
                .long("signing-secret")
                .help("HMAC signing secret, at least 32 bytes")
                .env("ONBOARD_SIGNING_SECRET")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new("signing-secret-file")
                .long("signing-secret-file")
                .help("Path to a file holding the HMAC signing secret")
                .env("ONBOARD_SIGNING_SECRET_FILE")
                .global(true),
        )
        .arg(
            Arg::new("max-ttl-seconds")
                .long("max-ttl-seconds")
                .help("Longest lifetime a link may be issued with")
                .default_value("604800")
                .env("ONBOARD_MAX_TTL_SECONDS")
                .global(true)
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("ONBOARD_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(server_command())
        .subcommand(issue_command())
}
