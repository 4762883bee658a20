mod config;
mod error;

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use desk::Desk;
use runtime::{
    Agent, AnthropicBackend, Backend, Conversation, McpToolHost, OpenAiBackend, ToolHost,
};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, Provider};
use error::Result;

const SCENARIOS: [&str; 3] = [
    "Get a list of recent customers and summarize their status",
    "Create a high-priority support ticket for customer 67890 about billing issues",
    "Calculate the account value for customer 12345 with purchases: $150, $300, $89",
];

#[derive(Parser)]
#[command(name = "deskmate")]
#[command(about = "A customer-service tool host and the agent that drives it", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./deskmate.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tool host on stdin/stdout
    Serve,
    /// List the host's tools, resource templates and prompts
    Tools,
    /// Show a customer record
    Customer {
        /// Customer ID, e.g. 12345
        id: String,
    },
    /// Render the customer-service response prompt
    Prompt {
        #[arg(long)]
        customer_name: String,
        #[arg(long)]
        issue_type: String,
        /// Resolution step (repeat for several)
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
    },
    /// Ask one question and print the answer
    Ask {
        question: String,
    },
    /// Run the demo customer-service scenarios
    Scenarios,
    /// Start an interactive chat session
    Chat,
}

/// What to do once an agent is connected.
enum Mode {
    Ask(String),
    Scenarios,
    Chat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Chat);
    if let Commands::Serve = command {
        return cmd_serve().await;
    }

    let config = Config::resolve(cli.config.as_deref())?;

    match command {
        Commands::Serve => cmd_serve().await,
        Commands::Tools => cmd_tools(&config).await,
        Commands::Customer { id } => cmd_customer(&config, &id).await,
        Commands::Prompt {
            customer_name,
            issue_type,
            steps,
        } => cmd_prompt(&config, customer_name, issue_type, steps).await,
        Commands::Ask { question } => cmd_agent(&config, Mode::Ask(question)).await,
        Commands::Scenarios => cmd_agent(&config, Mode::Scenarios).await,
        Commands::Chat => cmd_agent(&config, Mode::Chat).await,
    }
}

async fn cmd_serve() -> Result<()> {
    mcp::serve_stdio(&Desk::seeded()).await?;
    Ok(())
}

async fn connect(config: &Config) -> Result<McpToolHost> {
    let client_config = config.client_config()?;
    Ok(McpToolHost::spawn(client_config, config.connect_timeout()).await?)
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let host = connect(config).await?;

    println!("Tools:");
    for spec in host.specs() {
        println!("  {:<26} {}", spec.name, spec.description);
    }

    println!("\nResources:");
    for template in host.resource_templates().await? {
        let description = template.description.unwrap_or_default();
        println!("  {:<26} {description}", template.uri_template);
    }
    for resource in host.client().list_resources().await? {
        println!("  {:<26} {}", resource.uri, resource.name);
    }

    println!("\nPrompts:");
    let prompts = host.client().list_prompts().await?;
    for prompt in prompts {
        let args: Vec<_> = prompt.arguments.iter().map(|a| a.name.as_str()).collect();
        println!("  {:<26} ({})", prompt.name, args.join(", "));
    }

    host.shutdown().await?;
    Ok(())
}

async fn cmd_customer(config: &Config, id: &str) -> Result<()> {
    let host = connect(config).await?;
    let result = host.read_resource(&format!("customer://{id}")).await;
    host.shutdown().await?;

    let customer: Value = result.map_err(runtime::Error::from)?;
    println!("{customer:#}");
    Ok(())
}

async fn cmd_prompt(
    config: &Config,
    customer_name: String,
    issue_type: String,
    steps: Vec<String>,
) -> Result<()> {
    let host = connect(config).await?;
    let arguments = HashMap::from([
        ("customer_name".to_string(), customer_name),
        ("issue_type".to_string(), issue_type),
        ("resolution_steps".to_string(), Value::from(steps).to_string()),
    ]);
    let text = host.prompt(desk::SERVICE_RESPONSE_PROMPT, arguments).await;
    host.shutdown().await?;

    println!("{}", text?.trim());
    Ok(())
}

async fn cmd_agent(config: &Config, mode: Mode) -> Result<()> {
    config.validate()?;
    let host = connect(config).await?;
    let agent_config = config.agent_config();
    let provider = &config.provider;

    info!(provider = %provider.name, model = provider.model(), "starting agent");

    let host = match provider.name {
        Provider::OpenAi => {
            let mut builder = OpenAiBackend::builder(&provider.openai_model);
            if let Some(key) = &provider.openai_api_key {
                builder = builder.api_key(key);
            }
            if let Some(url) = &provider.openai_base_url {
                builder = builder.base_url(url);
            }
            drive(Agent::new(builder.build(), host, agent_config)?, mode).await?
        }
        Provider::Anthropic => {
            let key = provider.anthropic_api_key.clone().unwrap_or_default();
            let backend = AnthropicBackend::builder(key, &provider.anthropic_model).build();
            drive(Agent::new(backend, host, agent_config)?, mode).await?
        }
        Provider::Ollama => {
            let backend = OpenAiBackend::ollama(&provider.ollama_model, &provider.ollama_base_url);
            drive(Agent::new(backend, host, agent_config)?, mode).await?
        }
    };

    host.shutdown().await?;
    Ok(())
}

/// Run `mode` and hand the host back for shutdown.
async fn drive<B>(agent: Agent<B, McpToolHost>, mode: Mode) -> Result<McpToolHost>
where
    B: Backend + Display,
{
    match mode {
        Mode::Ask(question) => {
            let answer = agent.run(&mut Conversation::new(), question).await?;
            println!("{}", answer.text);
        }
        Mode::Scenarios => {
            for (i, scenario) in SCENARIOS.iter().enumerate() {
                println!("\nScenario {}: {scenario}", i + 1);
                match agent.run(&mut Conversation::new(), *scenario).await {
                    Ok(answer) => println!("Response: {}", answer.text),
                    Err(e) => {
                        warn!(scenario = i + 1, error = %e, "scenario failed");
                        println!("Error: {e}");
                    }
                }
                println!("{}", "-".repeat(60));
            }
        }
        Mode::Chat => chat(&agent).await?,
    }

    Ok(agent.into_host())
}

async fn chat<B>(agent: &Agent<B, McpToolHost>) -> Result<()>
where
    B: Backend + Display,
{
    println!("deskmate v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", agent.backend());
    println!("Tools: {}", agent.host().specs().len());
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut conversation = Conversation::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match agent.run(&mut conversation, input).await {
            Ok(answer) => println!("\n{}\n", answer.text),
            Err(e) => {
                eprintln!("Error: {e}\n");
                if !conversation.pending_calls().is_empty() {
                    conversation = Conversation::new();
                    eprintln!("Starting a new conversation.\n");
                }
            }
        }
    }

    println!("\nConversation {} ended.", conversation.id());
    Ok(())
}
