use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

mod util;

use util::{client, exit_error, read_image};

#[derive(Parser)]
#[command(name = "tutor", version, about = "Tutorgate CLI: ask the tutor from a terminal")]
struct Cli {
    /// API base URL
    #[arg(long, env = "TUTOR_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Student,
    Educator,
    Parent,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Explain,
    Check,
    Lesson,
    Worksheet,
    Assessment,
    Slides,
    Custom,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Send one tutoring request and print the reply
    Ask {
        /// The question or the work to check
        message: String,
        #[arg(long, value_enum, default_value = "student")]
        role: RoleArg,
        #[arg(long, value_enum, default_value = "explain")]
        action: ActionArg,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        /// Grade or level, e.g. "Grade 7"
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// How many times the learner has already tried (0-3)
        #[arg(long, default_value_t = 0)]
        attempt: u8,
        /// Photo of the learner's work (png, jpg, gif, webp)
        #[arg(long)]
        image: Option<PathBuf>,
        /// Session token from the identity provider
        #[arg(long, env = "TUTOR_SESSION_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Print the full JSON response instead of the reply text
        #[arg(long)]
        json: bool,
    },
}

impl RoleArg {
    fn as_str(self) -> &'static str {
        match self {
            RoleArg::Student => "student",
            RoleArg::Educator => "educator",
            RoleArg::Parent => "parent",
        }
    }
}

impl ActionArg {
    fn as_str(self) -> &'static str {
        match self {
            ActionArg::Explain => "explain",
            ActionArg::Check => "check",
            ActionArg::Lesson => "lesson",
            ActionArg::Worksheet => "worksheet",
            ActionArg::Assessment => "assessment",
            ActionArg::Slides => "slides",
            ActionArg::Custom => "custom",
        }
    }
}

struct AskArgs {
    message: String,
    role: RoleArg,
    action: ActionArg,
    subject: Option<String>,
    topic: Option<String>,
    level: Option<String>,
    country: Option<String>,
    attempt: u8,
    image: Option<PathBuf>,
    token: Option<String>,
    json: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Health => health(&cli.api_url).await,
        Commands::Ask {
            message,
            role,
            action,
            subject,
            topic,
            level,
            country,
            attempt,
            image,
            token,
            json,
        } => {
            ask(
                &cli.api_url,
                AskArgs {
                    message,
                    role,
                    action,
                    subject,
                    topic,
                    level,
                    country,
                    attempt,
                    image,
                    token,
                    json,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        exit_error(&e.to_string(), None);
    }
}

async fn health(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resp = client().get(format!("{api_url}/health")).send().await?;
    let body: serde_json::Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn request_body(args: &AskArgs) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut body = json!({
        "role": args.role.as_str(),
        "action": args.action.as_str(),
        "message": args.message,
        "attempt": args.attempt,
    });
    for (key, value) in [
        ("subject", &args.subject),
        ("topic", &args.topic),
        ("level", &args.level),
        ("country", &args.country),
    ] {
        if let Some(value) = value {
            body[key] = json!(value);
        }
    }
    if let Some(path) = &args.image {
        body["imageDataUrl"] = json!(read_image(path)?);
    }
    Ok(body)
}

async fn ask(api_url: &str, args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let body = request_body(&args)?;

    let mut req = client().post(format!("{api_url}/v1/tutor")).json(&body);
    if let Some(token) = &args.token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await?;
    let status = resp.status();
    let payload: serde_json::Value = resp.json().await?;

    if !status.is_success() {
        eprintln!("{}", serde_json::to_string_pretty(&payload)?);
        std::process::exit(match status.as_u16() {
            400..=499 => 1,
            _ => 2,
        });
    }

    match payload.get("reply").and_then(|r| r.as_str()) {
        Some(reply) if !args.json => println!("{reply}"),
        _ => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> AskArgs {
        AskArgs {
            message: "Is 3/4 + 1/4 = 1?".to_string(),
            role: RoleArg::Student,
            action: ActionArg::Check,
            subject: Some("Math".to_string()),
            topic: None,
            level: Some("Grade 5".to_string()),
            country: None,
            attempt: 1,
            image: None,
            token: None,
            json: false,
        }
    }

    #[test]
    fn request_body_uses_wire_names_and_skips_unset_fields() {
        let body = request_body(&args()).expect("body should build");
        assert_eq!(body["role"], "student");
        assert_eq!(body["action"], "check");
        assert_eq!(body["attempt"], 1);
        assert_eq!(body["subject"], "Math");
        assert_eq!(body["level"], "Grade 5");
        assert!(body.get("topic").is_none());
        assert!(body.get("imageDataUrl").is_none());
    }

    #[test]
    fn unsupported_image_is_rejected_before_sending() {
        let mut args = args();
        args.image = Some(PathBuf::from("worksheet.pdf"));
        assert!(request_body(&args).is_err());
    }

    #[test]
    fn cli_parses_ask_command() {
        let cli = Cli::try_parse_from([
            "tutor", "ask", "What is 2/3 of 9?", "--action", "explain", "--attempt", "2",
        ])
        .expect("arguments should parse");
        match cli.command {
            Commands::Ask { attempt, action, .. } => {
                assert_eq!(attempt, 2);
                assert_eq!(action.as_str(), "explain");
            }
            Commands::Health => panic!("expected ask"),
        }
    }
}
