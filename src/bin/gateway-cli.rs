use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the RTC gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "https://localhost:3000")]
    url: String,

    /// Accept self-signed certificates
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Issue an RTC token
    Token {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        role: Option<String>,
    },
    /// Decode and verify an RTC token
    Validate {
        #[arg(long)]
        token: String,
    },
    /// Issue a Zego token
    Zego {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Translate text
    Translate {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "cn")]
        from: String,
        #[arg(long, default_value = "en")]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(cli.insecure)
        .build()?;
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{base}/health")).send().await?,
        Commands::Token { uid, channel, role } => {
            let mut body = json!({ "uid": uid, "channelName": channel });
            if let Some(role) = role {
                body["role"] = Value::String(role);
            }
            client
                .post(format!("{base}/api/token/generate"))
                .json(&body)
                .send()
                .await?
        }
        Commands::Validate { token } => {
            client
                .post(format!("{base}/api/token/validate"))
                .json(&json!({ "token": token }))
                .send()
                .await?
        }
        Commands::Zego { user_id, ttl } => {
            let mut body = json!({ "userId": user_id });
            if let Some(ttl) = ttl {
                body["effectiveTimeInSeconds"] = json!(ttl);
            }
            client
                .post(format!("{base}/api/token/zegoGenerateToken"))
                .json(&body)
                .send()
                .await?
        }
        Commands::Translate { text, from, to } => {
            client
                .post(format!("{base}/api/token/xunfeiTranslate"))
                .json(&json!({ "text": text, "from": from, "to": to }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Error: gateway returned status {status}");
        eprintln!("{rendered}");
        std::process::exit(1);
    }
    Ok(())
}
