//! Prints an access token for calling the gateway by hand, e.g.
//!
//! ```text
//! curl -H "Authorization: Bearer $(sign_token)" http://localhost:3000/api/ai/openrouter/api/v1/models
//! ```
//!
//! The password comes from `--password` or `ACCESS_PASSWORD`.

use clap::Parser;
use research_gateway::signature::SignedRequest;

#[derive(Debug, Parser)]
#[command(name = "sign_token", about = "Generate a short-lived gateway access token")]
struct Args {
    #[arg(long, env = "ACCESS_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Sign this timestamp (ms since epoch) instead of now.
    #[arg(long)]
    timestamp: Option<i64>,

    /// Also print the timestamp that was signed.
    #[arg(long)]
    verbose: bool,
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let signed = match args.timestamp {
        Some(ts) => SignedRequest::new(&args.password, ts),
        None => SignedRequest::now(&args.password),
    };

    if args.verbose {
        println!("{} {}", signed.signature, signed.timestamp_ms);
    } else {
        println!("{}", signed.signature);
    }
}
