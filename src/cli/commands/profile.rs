//! Candidate profile CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{CandidateProfile, Config};
use crate::domain::ports::ProfileDirectory;

#[derive(Args, Debug)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Create or replace a candidate profile
    Set {
        /// Candidate user ID; a new one is generated when omitted
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        phone: Option<String>,
        #[arg(short, long)]
        location: Option<String>,
        /// Path to the resume file uploaded with applications
        #[arg(short, long)]
        resume: Option<String>,
    },
    /// Show a candidate profile
    Show {
        /// Candidate user ID
        user: Uuid,
    },
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ProfileOutput {
    profile: CandidateProfile,
}

impl CommandOutput for ProfileOutput {
    fn to_human(&self) -> String {
        let p = &self.profile;
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        format!(
            "Candidate profile:\n  User:     {}\n  Name:     {}\n  Email:    {}\n  Phone:    {}\n  Location: {}\n  Resume:   {}",
            p.user_id,
            p.full_name,
            or_dash(&p.email),
            or_dash(&p.phone),
            or_dash(&p.location),
            or_dash(&p.resume_file_reference),
        )
    }
}

pub async fn execute(args: ProfileArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        ProfileCommands::Set {
            user,
            name,
            email,
            phone,
            location,
            resume,
        } => {
            if name.trim().is_empty() {
                anyhow::bail!("Candidate name cannot be empty");
            }
            let profile = CandidateProfile {
                user_id: user.unwrap_or_else(Uuid::new_v4),
                full_name: name,
                email,
                phone,
                location,
                resume_file_reference: resume,
            };
            ctx.catalog
                .upsert_profile(&profile)
                .await
                .context("Failed to save profile")?;
            output(&ProfileOutput { profile }, json_mode);
        }
        ProfileCommands::Show { user } => {
            let profile = ctx
                .catalog
                .get_profile(user)
                .await
                .context("Failed to read profile")?
                .ok_or_else(|| anyhow::anyhow!("No candidate profile for user {user}"))?;
            output(&ProfileOutput { profile }, json_mode);
        }
    }
    Ok(())
}
