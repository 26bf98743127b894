use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "inference-cli")]
#[command(about = "Client for the inference API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the sentiment of a message
    Predict { message: String },
    /// Continue a prompt
    Generate {
        prompt: String,
        #[arg(long, default_value_t = 50)]
        max_length: i64,
    },
    /// Dump the metrics scrape
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Predict { message } => {
            let res = client
                .get(format!("{base}/predict/"))
                .query(&[("message", message)])
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Generate { prompt, max_length } => {
            let res = client
                .get(format!("{base}/generate/"))
                .query(&[("prompt", prompt), ("max_length", max_length.to_string())])
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Metrics => {
            let res = client.get(format!("{base}/metrics")).send().await?;
            if report_failure(&res) {
                eprintln!("Response: {}", res.text().await?);
                return Ok(());
            }
            print!("{}", res.text().await?);
        }
    }

    Ok(())
}

fn report_failure(res: &reqwest::Response) -> bool {
    let status = res.status();
    if status.is_success() {
        return false;
    }
    eprintln!("Error: API returned status {status}");
    true
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if report_failure(&res) {
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
