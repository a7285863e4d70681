//! 🚀 estap-cli: the front door.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary is the thin wrapper that parses args, sets up logging, loads
//! config, and then lets the library do the heavy lifting. Like a manager. 🦆
//!
//! ```text
//! estap run [CONFIG]                      # default: estap.toml
//! estap mapping <RESOURCE> --url <URL>    # e.g. cascading-hadoop/artists
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use estap::ElasticsearchConnection;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "estap", version, about = "🚰 Write delimited tuples into Elasticsearch, then check the mapping")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// ▶️ Run the flow described by a config file (plus ESTAP_* env vars).
    Run {
        #[arg(default_value = "estap.toml")]
        config: PathBuf,
    },
    /// 🗺️ Print the mapping of `index` or `index/type`.
    Mapping {
        resource: String,
        #[arg(long, default_value = "http://localhost:9200")]
        url: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        /// 🏷️ Keep `_`-prefixed metadata fields.
        #[arg(long)]
        with_headers: bool,
    },
}

#[tokio::main]
async fn main() {
    // 📡 Set up tracing, because println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command).await {
        report(&err);
        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }
}

async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run { config } => run(&config).await,
        Command::Mapping {
            resource,
            url,
            username,
            password,
            api_key,
            with_headers,
        } => {
            let connection = ElasticsearchConnection {
                url,
                username,
                password,
                api_key,
            };
            let mapping = estap::fetch_mapping(connection, &resource)
                .await
                .with_context(|| format!("💀 Could not fetch the mapping of '{}'", resource))?;
            if with_headers {
                println!("{}", mapping);
            } else {
                println!("{}", mapping.skip_headers());
            }
            Ok(())
        }
    }
}

async fn run(config: &Path) -> Result<()> {
    // 🔒 A missing file is allowed: ESTAP_* env vars can carry the whole config.
    let config_file = match config.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the configuration file exists. If it's a relative path, \
             pwd/cwd might not be what you think; an absolute path settles it. Was checking here: '{}'",
            config.display()
        )
    })? {
        true => Some(config),
        false => None,
    };

    let app_config = estap::app_config::load_config(config_file).context(
        "💀 We couldn't load the config. Take a look at the file and make sure you didn't forget something obvious.",
    )?;
    let stats = estap::run(app_config).await?;
    println!("{}", stats);
    Ok(())
}

/// 🧅 Peel the error chain one layer at a time, and sniff for connection trouble.
fn report(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut looks_like_connectivity = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            looks_like_connectivity = true;
        }
    }

    if looks_like_connectivity {
        error!(
            "🔧 hint: looks like Elasticsearch isn't reachable. Double-check the url (or es.nodes) \
             and that the cluster is actually running. If you're using Docker, `docker ps` shows \
             what's up and `docker compose up -d` resurrects it. ☕"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_run_defaults_to_estap_toml() {
        let cli = Cli::try_parse_from(["estap", "run"]).expect("run without args should parse");
        match cli.command {
            Command::Run { config } => assert_eq!(config, PathBuf::from("estap.toml")),
            other => panic!("💀 expected Run, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_mapping_takes_a_resource_and_a_url() {
        let cli = Cli::try_parse_from(["estap", "mapping", "cascading-hadoop/artists", "--url", "http://es:9200"])
            .expect("mapping args should parse");
        match cli.command {
            Command::Mapping {
                resource,
                url,
                with_headers,
                ..
            } => {
                assert_eq!(resource, "cascading-hadoop/artists");
                assert_eq!(url, "http://es:9200");
                assert!(!with_headers);
            }
            other => panic!("💀 expected Mapping, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_mapping_without_a_resource_is_refused() {
        assert!(Cli::try_parse_from(["estap", "mapping"]).is_err());
    }
}
