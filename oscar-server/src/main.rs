//! CLI entry point. No protocol logic lives here -- flag parsing,
//! logger setup, store open, and listener bind only.

mod listen;

use std::process::ExitCode;

use clap::Parser;
use oscar_core::{parse_listeners_cfg, RawListenersCfg};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// A legacy OSCAR (AIM/ICQ) instant-messaging server.
#[derive(Debug, Parser)]
#[command(name = "oscar-server", version, about)]
struct Cli {
    /// BOS bind listener, `SCHEME://HOST:PORT`. Repeatable.
    #[arg(long = "bind", value_name = "SCHEME://HOST:PORT")]
    bind: Vec<String>,

    /// Plaintext advertised BOS host for the matching `--bind` scheme.
    #[arg(long = "advertise", value_name = "SCHEME://HOST:PORT")]
    advertise: Vec<String>,

    /// SSL advertised BOS host for the matching `--bind` scheme.
    #[arg(long = "advertise-ssl", value_name = "SCHEME://HOST:PORT")]
    advertise_ssl: Vec<String>,

    /// Kerberos listener for the matching `--bind` scheme.
    #[arg(long = "kerberos", value_name = "SCHEME://HOST:PORT")]
    kerberos: Vec<String>,

    /// TOC bridge listener, `HOST:PORT`. Repeatable.
    #[arg(long = "toc", value_name = "HOST:PORT")]
    toc: Vec<String>,

    /// HTTP management API listener, `HOST:PORT`.
    #[arg(long = "api", value_name = "HOST:PORT")]
    api: Option<String>,

    /// SQLite database path (created if missing).
    #[arg(long = "db-path", default_value = "oscar.db")]
    db_path: String,

    /// Logger filter, e.g. `info`, `debug`, `oscar_core=debug`.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Skip password verification during signon. Development use only.
    #[arg(long = "disable-auth")]
    disable_auth: bool,

    /// HMAC key for baking auth cookies. Generated at random if absent,
    /// which invalidates cookies minted before a restart.
    #[arg(long = "cookie-secret", env = "OSCAR_COOKIE_SECRET")]
    cookie_secret: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let raw = RawListenersCfg {
        bind: cli.bind.clone(),
        advertise_plain: cli.advertise.clone(),
        advertise_ssl: cli.advertise_ssl.clone(),
        kerberos: cli.kerberos.clone(),
        toc: cli.toc.clone(),
        api: cli.api.clone(),
    };
    let listeners = match parse_listeners_cfg(&raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            log::error!("invalid listener configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            log::error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(listen::run(listen::ServerOptions {
        listeners,
        db_path: cli.db_path,
        disable_auth: cli.disable_auth,
        cookie_secret: cli.cookie_secret,
    })) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("unrecoverable error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
