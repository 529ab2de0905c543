use clap::Parser;
use leadership_insight_agent::{agent::Orchestrator, config::Config, QueryResponse};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ask questions about the indexed annual reports.
#[derive(Parser, Debug)]
#[command(name = "insight", version, about)]
struct Args {
    /// Answer a single question and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Print the raw JSON response envelope
    #[arg(long)]
    json: bool,
}

fn print_response(response: &QueryResponse, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("\n{}\n", response.answer);
    if !response.sources.is_empty() {
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            println!(
                "  [{}] {} {} | {} (score {:.3})",
                i + 1,
                source.company,
                source.year,
                source.section,
                source.score
            );
        }
    }
    if let Some(path) = &response.image_path {
        println!("Chart: {}", path);
    }
    println!(
        "Tools: {} | planner {:.3}s, tool {:.3}s, llm {:.3}s, total {:.3}s",
        response.tools_used.join(", "),
        response.metrics.planner_latency_s,
        response.metrics.tool_latency_s,
        response.metrics.llm_latency_s,
        response.metrics.total_latency_s
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    info!(model = %config.llm_model, "Leadership insight agent ready");

    if let Some(query) = args.query {
        let response = orchestrator.handle(&query).await?;
        return print_response(&response, args.json);
    }

    println!("Leadership insight agent. Ask about the annual reports; 'exit' to quit.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if matches!(query, "exit" | "quit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        match orchestrator.handle(query).await {
            Ok(response) => print_response(&response, args.json)?,
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}
