//! Administers a running node over its authenticated admin HTTP surface
//! (spec §6): status, log-level control, config get/patch/reload, and
//! settlement/withdrawal. Built the same way
//! `piri_installer::HttpNodeStatusClient` talks to the same surface —
//! bearer-auth over `reqwest`, failures carried as `anyhow::Error` rather
//! than a typed error enum, since every caller here is this binary's own
//! `main`.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

#[derive(Args)]
pub struct AdminArgs {
    /// The node's own admin HTTP base URL, e.g. `http://127.0.0.1:8080`.
    #[arg(long, global = true)]
    base_url: String,
    /// Bearer token for the node's admin surface.
    #[arg(long, global = true)]
    token: String,
    #[command(subcommand)]
    command: AdminCommand,
}

#[derive(Subcommand)]
enum AdminCommand {
    /// `GET /admin/status`.
    Status,
    Config(ConfigArgs),
    Log(LogArgs),
    Payment(PaymentArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// `GET /admin/config`.
    Get,
    /// `PATCH /admin/config`.
    Patch {
        /// A `key=value` pair; repeat for multiple keys.
        #[arg(long = "set", value_parser = parse_key_val)]
        updates: Vec<(String, String)>,
        /// Persist the change to the on-disk config file.
        #[arg(long)]
        persist: bool,
    },
    /// `POST /admin/config/reload`.
    Reload,
}

#[derive(Args)]
struct LogArgs {
    #[command(subcommand)]
    command: LogCommand,
}

#[derive(Subcommand)]
enum LogCommand {
    /// `GET /admin/log/list`.
    List,
    /// `POST /admin/log/set`.
    Set {
        #[arg(long)]
        system: String,
        #[arg(long)]
        level: String,
    },
    /// `POST /admin/log/set-regex`.
    SetRegex {
        #[arg(long)]
        expression: String,
        #[arg(long)]
        level: String,
    },
}

#[derive(Args)]
struct PaymentArgs {
    #[command(subcommand)]
    command: PaymentCommand,
}

#[derive(Subcommand)]
enum PaymentCommand {
    /// `GET /admin/payment/account`.
    Account,
    /// `GET /admin/payment/settle/{id}/estimate`.
    SettleEstimate { rail_id: u64 },
    /// `POST /admin/payment/settle/{id}`.
    Settle { rail_id: u64 },
    /// `GET /admin/payment/settle/{id}/status`.
    SettleStatus { rail_id: u64 },
    /// `POST /admin/payment/withdraw/estimate`.
    WithdrawEstimate {
        /// Base-unit amount to withdraw; omit to estimate the full balance.
        #[arg(long)]
        amount: Option<String>,
    },
    /// `POST /admin/payment/withdraw`.
    Withdraw {
        #[arg(long)]
        amount: Option<String>,
    },
    /// `GET /admin/payment/withdraw/status`.
    WithdrawStatus,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    Ok((key.to_string(), value.to_string()))
}

struct AdminClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AdminClient {
    fn new(base_url: String, token: String) -> Result<Self> {
        let http = reqwest::Client::builder().build().context("failed to build admin HTTP client")?;
        Ok(Self { http, base_url, token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/admin{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.url(path)).bearer_auth(&self.token).send().await?;
        Self::parse(response).await
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let response = self.http.post(self.url(path)).bearer_auth(&self.token).json(body).send().await?;
        Self::parse(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<Value> {
        let response = self.http.post(self.url(path)).bearer_auth(&self.token).send().await?;
        Self::parse(response).await
    }

    async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let response = self.http.patch(self.url(path)).bearer_auth(&self.token).json(body).send().await?;
        Self::parse(response).await
    }

    async fn parse(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let bytes = response.bytes().await.context("failed to read admin response body")?;
        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str().map(str::to_string)))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            bail!("admin request failed ({status}): {message}");
        }
        if bytes.is_empty() { Ok(Value::Null) } else { serde_json::from_slice(&bytes).context("failed to parse admin response") }
    }
}

pub async fn run(args: AdminArgs) -> Result<()> {
    let client = AdminClient::new(args.base_url, args.token)?;

    let result = match args.command {
        AdminCommand::Status => client.get("/status").await?,
        AdminCommand::Config(config) => match config.command {
            ConfigCommand::Get => client.get("/config").await?,
            ConfigCommand::Patch { updates, persist } => {
                let updates: HashMap<String, String> = updates.into_iter().collect();
                client.patch_json("/config", &serde_json::json!({ "updates": updates, "persist": persist })).await?
            }
            ConfigCommand::Reload => client.post_empty("/config/reload").await?,
        },
        AdminCommand::Log(log) => match log.command {
            LogCommand::List => client.get("/log/list").await?,
            LogCommand::Set { system, level } => {
                client.post_json("/log/set", &serde_json::json!({ "system": system, "level": level })).await?
            }
            LogCommand::SetRegex { expression, level } => {
                client.post_json("/log/set-regex", &serde_json::json!({ "expression": expression, "level": level })).await?
            }
        },
        AdminCommand::Payment(payment) => match payment.command {
            PaymentCommand::Account => client.get("/payment/account").await?,
            PaymentCommand::SettleEstimate { rail_id } => client.get(&format!("/payment/settle/{rail_id}/estimate")).await?,
            PaymentCommand::Settle { rail_id } => client.post_empty(&format!("/payment/settle/{rail_id}")).await?,
            PaymentCommand::SettleStatus { rail_id } => client.get(&format!("/payment/settle/{rail_id}/status")).await?,
            PaymentCommand::WithdrawEstimate { amount } => {
                client.post_json("/payment/withdraw/estimate", &serde_json::json!({ "amount": amount })).await?
            }
            PaymentCommand::Withdraw { amount } => {
                client.post_json("/payment/withdraw", &serde_json::json!({ "amount": amount })).await?
            }
            PaymentCommand::WithdrawStatus => client.get("/payment/withdraw/status").await?,
        },
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
