// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use authsession::{SessionConfig, SessionContext, UpdateUser};

/// Drive a session against a live auth backend.
#[derive(Parser)]
#[command(name = "authsession", version)]
struct Cli {
    #[command(flatten)]
    config: SessionConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the backend answers on its public endpoint
    Ping,
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the persisted session after re-validating it
    Whoami,
    /// Exchange the refresh token for a new pair now
    Refresh,
    /// Revoke the refresh token and forget the session
    Logout,
    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Check whether a password reset token is still valid
    ValidateResetToken { token: String },
    /// Set a new password with a reset token
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "AUTH_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Manage users
    Users {
        #[command(subcommand)]
        command: Option<UsersCommand>,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List all users (default)
    List,
    /// Rename a user or change their email
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Delete a user
    Delete { id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = authsession::open(&cli.config)?;

    match cli.command {
        Command::Ping => {
            ctx.ping().await?;
            println!("ok");
        }
        Command::Login { email, password } => print_json(&ctx.login(&email, &password).await?)?,
        Command::Signup { name, email, password } => {
            print_json(&ctx.signup(&name, &email, &password).await?)?;
        }
        Command::Whoami => {
            resume(&ctx).await?;
            print_json(&ctx.snapshot())?;
        }
        Command::Refresh => {
            resume(&ctx).await?;
            let pair = ctx.gateway().refresh().await?;
            println!("refreshed, expires in {}s", pair.expires_in_secs);
        }
        Command::Logout => {
            resume(&ctx).await?;
            ctx.logout().await;
            println!("signed out");
        }
        Command::ForgotPassword { email } => {
            ctx.forgot_password(&email).await?;
            println!("reset link sent to {email}");
        }
        Command::ValidateResetToken { token } => {
            let valid = ctx.validate_reset_token(&token).await?;
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(2);
            }
        }
        Command::ResetPassword { token, password } => {
            ctx.reset_password(&token, &password).await?;
            println!("password updated");
        }
        Command::Users { command } => {
            resume(&ctx).await?;
            match command.unwrap_or(UsersCommand::List) {
                UsersCommand::List => print_json(&ctx.list_users().await?)?,
                UsersCommand::Update { id, name, email } => {
                    let update = UpdateUser { name, email, ..UpdateUser::default() };
                    print_json(&ctx.update_user(id, &update).await?)?;
                }
                UsersCommand::Delete { id } => {
                    ctx.delete_user(id).await?;
                    println!("deleted user {id}");
                }
            }
        }
    }
    Ok(())
}

/// Restore the persisted session and wait for its profile check.
async fn resume(ctx: &SessionContext) -> anyhow::Result<()> {
    let Some(check) = ctx.restore() else {
        anyhow::bail!("not signed in (run `authsession login` first)");
    };
    check.await?;
    let state = ctx.snapshot();
    if state.status == authsession::SessionStatus::Anonymous {
        let reason = state.last_error.unwrap_or_else(|| "session ended".to_owned());
        anyhow::bail!("stored session is no longer valid: {reason}");
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
