use std::{io::{BufRead, Write}, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};

use easydict_scheme::{
    file_store::FileStore,
    url_scheme_handler::BufferedTask,
    SchemeParser, UrlSchemeHandler,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an easydict:// URL against the preferences file
    Open {
        url: String,
        /// Do not ask before actions that modify preferences
        #[arg(long, short)]
        yes: bool,
    },
    /// Tell whether the text is an easydict:// URL
    Check {
        text: String,
    },
    /// Fetch a URL through the shared scheme handler and print the decoded JSON body
    Fetch {
        url: String,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = easydict_config::load_config();
    easydict_scheme::init_logging(&config);

    match args.command {
        Command::Open { url, yes } => {
            let store = FileStore::open(easydict_scheme::config::preferences_path(&config)?)?;
            let parser = SchemeParser::from_config(Arc::new(store), &config);
            if !parser.is_easydict_scheme(&url) {
                return Err(anyhow!("not an {}:// URL: {url}", parser.scheme()));
            }
            if let Ok(request) = parser.parse(&url) {
                if request.action_key.is_write() && !yes && !confirm(&format!("run {}?", request.action_key))? {
                    log::info!("{} cancelled", request.action_key);
                    return Ok(());
                }
            }
            let result = parser.open_url_scheme(&url).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Check { text } => {
            let is_scheme = easydict_scheme::is_easydict_scheme(&text);
            println!("{is_scheme}");
            if !is_scheme {
                std::process::exit(1);
            }
        }
        Command::Fetch { url, timeout } => {
            let handler = UrlSchemeHandler::shared_instance();
            let monitored = handler.monitor_url_timeout(&url, Duration::from_secs(timeout));

            let mut request = http::Request::new(Bytes::new());
            *request.uri_mut() = url.parse()?;
            let (task, response) = BufferedTask::new(request);
            handler.start_url_scheme_task(Box::new(task));

            let monitored = monitored.await;
            if let Some(e) = monitored.error {
                return Err(e.into());
            }
            let response = response.await??;
            log::info!("{} answered {}", url, response.status());
            match monitored.object {
                Some(object) => println!("{}", serde_json::to_string_pretty(&object)?),
                None => println!("{}", String::from_utf8_lossy(response.body())),
            }
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
