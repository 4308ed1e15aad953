//! Command implementations.

use crate::context::{
    Context, DATABASE_CONFIG, DEPLOYMENT_CONFIG, ECS_CONFIG, TASK_DEFINITION_CONFIG,
};
use crate::export;
use crate::OutputFormat;
use anyhow::{Context as _, Result};
use clap::Args;
use prenv_config::{ecs, loader, EcsConfig, Environment, BINDING_PREFIX};
use prenv_lease::{release, Allocator, Catalog, GitHubLabelStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pull request being deployed.
#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Repository in owner/repo format
    #[arg(short, long)]
    pub repo: String,

    /// Pull request number
    #[arg(short, long)]
    pub pr: u64,

    /// Branch name
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Pull request author
    #[arg(short, long)]
    pub author: Option<String>,

    /// Container image
    #[arg(short, long)]
    pub image: Option<String>,

    /// Commit SHA
    #[arg(short, long)]
    pub sha: Option<String>,

    /// Stack name prefix used instead of the repository name
    #[arg(long)]
    pub stackname: Option<String>,
}

impl DeployArgs {
    /// `PRENV_*` bindings describing this deploy.
    pub fn bindings(&self, ecs: &EcsConfig) -> Result<BTreeMap<String, String>> {
        let (org, repo) = parse_repo(&self.repo)?;
        let stack_name = ecs::stack_name(repo, self.pr, self.stackname.as_deref());

        let mut bindings = BTreeMap::new();
        let mut bind = |name: &str, value: String| {
            bindings.insert(format!("{BINDING_PREFIX}{name}"), value);
        };

        bind("ORG", org.to_string());
        bind("REPO", repo.to_string());
        bind("PR", self.pr.to_string());
        bind("TASK_FAMILY", ecs::task_family(repo, self.pr));
        for (name, value) in [
            ("BRANCH", &self.branch),
            ("AUTHOR", &self.author),
            ("IMAGE", &self.image),
            ("SHA", &self.sha),
        ] {
            if let Some(value) = value {
                bind(name, value.clone());
            }
        }
        if let Some(dns_name) = ecs.dns_name(&stack_name) {
            bind("DNS_NAME", dns_name);
        } else {
            info!("DNS is not configured, no record will be managed");
        }
        bind("STACK_NAME", stack_name);

        Ok(bindings)
    }
}

/// Split `owner/repo`.
pub fn parse_repo(repo_str: &str) -> Result<(&str, &str)> {
    match repo_str.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => anyhow::bail!("Invalid repository format. Expected 'owner/repo', got: {repo_str}"),
    }
}

/// Load the ECS config, then expose the deploy bindings to later resolution.
async fn prepare(ctx: &mut Context, deploy: &DeployArgs) -> Result<EcsConfig> {
    let document = ctx
        .load_resolved(ECS_CONFIG)
        .await
        .context("ECS configuration file is not available or invalid")?;
    let ecs = EcsConfig::from_document(&document)?;

    let bindings = deploy.bindings(&ecs)?;
    for (name, value) in &bindings {
        info!("{name}: {value}");
    }
    ctx.env.extend(bindings);
    Ok(ecs)
}

pub async fn run_check(mut ctx: Context, deploy: &DeployArgs) -> Result<()> {
    let ecs = prepare(&mut ctx, deploy).await?;
    println!(
        "{ECS_CONFIG}: ok (cluster {}, {} subnets, public ip {:?})",
        ecs.cluster,
        ecs.subnet_ids.len(),
        ecs.public_ip
    );

    ctx.load_resolved(TASK_DEFINITION_CONFIG).await?;
    println!("{TASK_DEFINITION_CONFIG}: ok");

    match ctx.load_optional(DATABASE_CONFIG).await? {
        Some(document) => {
            let catalog = Catalog::from_document(&document)?;
            println!(
                "{DATABASE_CONFIG}: ok ({} databases, {} exclusive)",
                catalog.len(),
                catalog.exclusive().count()
            );
        }
        None => println!("{DATABASE_CONFIG}: not present"),
    }

    Ok(())
}

pub async fn run_render(
    mut ctx: Context,
    deploy: &DeployArgs,
    output: Option<PathBuf>,
) -> Result<()> {
    prepare(&mut ctx, deploy).await?;

    let resolved = ctx.load_resolved(TASK_DEFINITION_CONFIG).await?;
    let output = output.unwrap_or_else(|| ctx.path(DEPLOYMENT_CONFIG));
    loader::write_document(&resolved, &output)?;

    info!("Rendered task definition to {}", output.display());
    println!("{}", output.display());
    Ok(())
}

pub fn run_template(env: &Environment, input: &Path, output: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    std::fs::write(output, env.substitute_tokens(&text))
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Substituted bindings into {}", output.display());
    Ok(())
}

pub async fn run_allocate(
    mut ctx: Context,
    deploy: &DeployArgs,
    token: &str,
    format: OutputFormat,
    github_env: Option<&Path>,
) -> Result<()> {
    prepare(&mut ctx, deploy).await?;

    let Some(document) = ctx.load_optional(DATABASE_CONFIG).await? else {
        info!("Database configuration file is not available");
        return Ok(());
    };
    let catalog = Catalog::from_document(&document)?;

    let (owner, repo) = parse_repo(&deploy.repo)?;
    let store = GitHubLabelStore::new(token, owner, repo)?;
    let allocation = Allocator::new(&catalog, &store).allocate(deploy.pr).await?;
    let bindings = allocation.database.bindings();

    match format {
        OutputFormat::Env => print!("{}", export::env_lines(&bindings)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "database": allocation.name,
                "share": allocation.database.share,
                "bindings": bindings,
            }))?
        ),
    }

    if let Some(path) = github_env {
        export::append_env_file(path, &bindings)?;
        info!("Exported {} bindings to {}", bindings.len(), path.display());
    }

    Ok(())
}

pub async fn run_release(deploy: &DeployArgs, token: &str) -> Result<()> {
    let (owner, repo) = parse_repo(&deploy.repo)?;
    let store = GitHubLabelStore::new(token, owner, repo)?;

    match release(&store, deploy.pr).await? {
        Some(name) => println!("Released database {name} from PR #{}", deploy.pr),
        None => println!("No database leased to PR #{}", deploy.pr),
    }
    Ok(())
}
