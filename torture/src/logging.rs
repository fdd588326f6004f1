use std::io::{self, IsTerminal as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

const ENV_NAME: &str = "DYNARR_TORTURE_LOG";

fn istty() -> bool {
    io::stdout().is_terminal() && io::stderr().is_terminal()
}

/// Creates the env filter from [`ENV_NAME`], defaulting to `info`.
fn env_filter() -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    match std::env::var(ENV_NAME) {
        Ok(env) => builder.parse(env).unwrap(),
        Err(std::env::VarError::NotPresent) => builder.parse("").unwrap(),
        Err(std::env::VarError::NotUnicode(_)) => {
            panic!("Environment variable {} is not unicode", ENV_NAME);
        }
    }
}

pub fn init() {
    let format = fmt::format()
        .with_level(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(true)
        .compact()
        .with_timer(fmt::time::SystemTime::default());
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(io::stdout)
        .with_ansi(istty())
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}
