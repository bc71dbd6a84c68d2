use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    config::parse_base_url,
    load_client_settings,
    views::{filter_leads, scope_leads, sort_leads, LeadFilter, LeadScope, Selection, SortKey},
    CancellationToken, Notifier, PipelineClient,
};
use shared::{
    domain::{Agent, AgentId, LeadId, LeadPriority, LeadSource, LeadStatus, Tag, TagId},
    protocol::{AgentDraft, AgentPatch, CommentDraft, LeadDraft, LeadPatch, TagDraft},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(name = "pipeline", about = "Sales pipeline client")]
struct Cli {
    /// Overrides the API base URL from pipeline.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List leads, optionally filtered, scoped and sorted.
    Leads {
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long, default_value = "all")]
        agent: String,
        #[arg(long, default_value = "all")]
        priority: String,
        #[arg(long, default_value = "")]
        sort: String,
        #[arg(long, default_value = "all")]
        scope: String,
    },
    Agents,
    Tags,
    AddLead {
        name: String,
        #[arg(long, default_value = "Website")]
        source: String,
        #[arg(long, default_value = "New")]
        status: String,
        #[arg(long, default_value = "Medium")]
        priority: String,
        #[arg(long, default_value_t = 30)]
        time_to_close: u32,
        /// Agent id.
        #[arg(long)]
        agent: Option<String>,
        /// Tag id, repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Change any lead field; omitted flags stay as they are.
    EditLead {
        lead_id: String,
        #[command(flatten)]
        edit: LeadEdit,
    },
    SetStatus {
        lead_id: String,
        status: String,
    },
    DeleteLead {
        lead_id: String,
    },
    AddAgent {
        name: String,
        email: String,
        #[arg(long)]
        role: Option<String>,
    },
    EditAgent {
        agent_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<String>,
    },
    DeleteAgent {
        agent_id: String,
    },
    AddTag {
        name: String,
    },
    DeleteTag {
        tag_id: String,
    },
    /// Comment on a lead as the given agent.
    Comment {
        lead_id: String,
        author: String,
        text: String,
    },
    Comments {
        lead_id: String,
    },
    Report,
}

#[derive(Args, Debug, Default)]
struct LeadEdit {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    time_to_close: Option<u32>,
    /// Agent id to assign.
    #[arg(long, conflicts_with = "unassign")]
    agent: Option<String>,
    #[arg(long)]
    unassign: bool,
    /// Replaces the lead's tags; repeatable.
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long, conflicts_with = "tags")]
    clear_tags: bool,
}

impl LeadEdit {
    fn into_patch(self) -> Result<LeadPatch> {
        let sales_agent = if self.unassign {
            Some(None)
        } else {
            self.agent.map(|id| Some(AgentId::from(id)))
        };
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.into_iter().map(TagId::from).collect())
        };
        let patch = LeadPatch {
            name: self.name,
            source: self.source.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
            priority: self.priority.as_deref().map(str::parse).transpose()?,
            time_to_close: self.time_to_close,
            sales_agent,
            tags,
        };
        if patch == LeadPatch::default() {
            anyhow::bail!("nothing to change");
        }
        Ok(patch)
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("ok: {message}");
    }

    fn failure(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_client_settings(cli.config.as_deref())?;
    if let Some(url) = &cli.api_url {
        settings.api_base_url = parse_base_url(url)?.to_string();
    }
    let client = PipelineClient::with_notifier(settings, Arc::new(ConsoleNotifier))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = run(&client, cli.command, &cancel).await;
    if let Some(listener) = client.shutdown() {
        if let Err(err) = listener.await {
            warn!(error = %err, "cli: listener task failed");
        }
    }
    outcome
}

async fn run(client: &PipelineClient, command: Command, cancel: &CancellationToken) -> Result<()> {
    client
        .load(cancel)
        .await
        .with_context(|| format!("could not load from {}", client.settings().api_base_url))?;
    let store = client.store();
    let coordinator = client.coordinator();

    match command {
        Command::Leads {
            status,
            agent,
            priority,
            sort,
            scope,
        } => {
            let filter = LeadFilter {
                status: Selection::parse(&status)?,
                agent: Selection::parse(&agent)?,
                priority: Selection::parse(&priority)?,
            };
            let scope: LeadScope = scope.parse().map_err(anyhow::Error::msg)?;
            let rows = scope_leads(&client.lead_rows(), scope);
            let rows = sort_leads(&filter_leads(&rows, &filter), SortKey::parse(&sort));
            print!("{}", render::lead_table(&rows, &store.all::<Tag>()));
        }
        Command::Agents => {
            print!(
                "{}",
                render::agent_table(&store.all::<Agent>(), &client.lead_rows())
            );
        }
        Command::Tags => print!("{}", render::tag_list(&store.all::<Tag>())),
        Command::AddLead {
            name,
            source,
            status,
            priority,
            time_to_close,
            agent,
            tags,
        } => {
            let draft = LeadDraft {
                name,
                source: source.parse::<LeadSource>()?,
                status: status.parse::<LeadStatus>()?,
                priority: priority.parse::<LeadPriority>()?,
                time_to_close,
                sales_agent: agent.map(AgentId::from),
                tags: tags.into_iter().map(TagId::from).collect(),
            };
            let lead = coordinator.create_lead(draft, cancel).await?;
            println!("{}", lead.id);
        }
        Command::EditLead { lead_id, edit } => {
            coordinator
                .update_lead(&LeadId::from(lead_id.as_str()), edit.into_patch()?, cancel)
                .await?;
        }
        Command::SetStatus { lead_id, status } => {
            let patch = LeadPatch::status(status.parse::<LeadStatus>()?);
            coordinator
                .update_lead(&LeadId::from(lead_id.as_str()), patch, cancel)
                .await?;
        }
        Command::DeleteLead { lead_id } => {
            coordinator
                .delete_lead(&LeadId::from(lead_id.as_str()), cancel)
                .await?;
        }
        Command::AddAgent { name, email, role } => {
            let agent = coordinator
                .create_agent(AgentDraft { name, email, role }, cancel)
                .await?;
            println!("{}", agent.id);
        }
        Command::EditAgent {
            agent_id,
            name,
            email,
            role,
        } => {
            let patch = AgentPatch { name, email, role };
            if patch == AgentPatch::default() {
                anyhow::bail!("nothing to change");
            }
            coordinator
                .update_agent(&AgentId::from(agent_id), patch, cancel)
                .await?;
        }
        Command::DeleteAgent { agent_id } => {
            coordinator
                .delete_agent(&AgentId::from(agent_id), cancel)
                .await?;
        }
        Command::AddTag { name } => {
            let tag = coordinator.create_tag(TagDraft { name }, cancel).await?;
            println!("{}", tag.id);
        }
        Command::DeleteTag { tag_id } => {
            coordinator.delete_tag(&TagId::from(tag_id), cancel).await?;
        }
        Command::Comment {
            lead_id,
            author,
            text,
        } => {
            let draft = CommentDraft {
                text,
                author: AgentId::from(author),
            };
            coordinator
                .add_comment(&LeadId::from(lead_id.as_str()), draft, cancel)
                .await?;
        }
        Command::Comments { lead_id } => {
            let comments = client
                .gateway()
                .list_comments(&LeadId::from(lead_id.as_str()), cancel)
                .await?;
            print!(
                "{}",
                render::comment_list(&comments, &store.all::<Agent>())
            );
        }
        Command::Report => match client.reports().snapshot() {
            Some(report) => print!("{}", render::report(&report)),
            None => {
                let reason = client
                    .reports()
                    .last_error()
                    .unwrap_or_else(|| "no report available".to_string());
                anyhow::bail!("report unavailable: {reason}");
            }
        },
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
