//! `labctl`, command-line client for the `SecLab` training platform.
//!
//! A standalone HTTP client for the server's JSON API. It has no internal
//! crate dependencies; everything goes over REST.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// labctl: manage SecLab exercises, pages and accounts.
#[derive(Parser)]
#[command(
    name = "labctl",
    version,
    about = "SecLab CLI: browse and manage training content and accounts",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         SECLAB_ADDR    Server address (default: http://127.0.0.1:8080)\n  \
         SECLAB_TOKEN   Session token from `labctl login`\n\n\
         {DIM}Examples:{RESET}\n  \
         labctl health\n  \
         labctl login --username admin\n  \
         labctl list --under exercise/sqli-basics\n  \
         labctl create step find-the-input --title 'Find the input' --parent exercise/sqli-basics\n  \
         labctl delete exercise/sqli-basics --cascade"
    ),
)]
struct Cli {
    /// SecLab server address.
    #[arg(long, env = "SECLAB_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Session token.
    #[arg(long, env = "SECLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health and region.
    Health,
    /// Create a standard account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Password (prefer the environment variable).
        #[arg(long, env = "SECLAB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in and print a session token.
    Login {
        #[arg(long)]
        username: String,
        /// Password (prefer the environment variable).
        #[arg(long, env = "SECLAB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the account behind the current token.
    Whoami,
    /// Change the current account's password.
    Passwd {
        #[arg(long, env = "SECLAB_PASSWORD", hide_env_values = true)]
        current: String,
        #[arg(long, env = "SECLAB_NEW_PASSWORD", hide_env_values = true)]
        new: String,
    },
    /// List content: top-level exercises, the children of a node, or everything.
    List {
        /// Parent node as kind/slug.
        #[arg(long, conflicts_with = "all")]
        under: Option<String>,
        /// Every node, hidden ones included (admin).
        #[arg(long)]
        all: bool,
    },
    /// Show one node and its children.
    Show {
        /// Node as kind/slug.
        key: String,
    },
    /// Create a node (admin).
    Create {
        kind: Kind,
        slug: String,
        #[command(flatten)]
        fields: NodeFields,
        /// Parent node as kind/slug.
        #[arg(long)]
        parent: Option<String>,
    },
    /// Update a node's title, body, order or visibility (admin).
    Update {
        /// Node as kind/slug.
        key: String,
        #[command(flatten)]
        fields: NodeFields,
        /// Make the node visible again.
        #[arg(long, conflicts_with = "hidden")]
        public: bool,
    },
    /// Delete a node (admin).
    Delete {
        /// Node as kind/slug.
        key: String,
        /// Also delete everything beneath it.
        #[arg(long)]
        cascade: bool,
    },
    /// Download every node as a JSON snapshot (admin).
    Export {
        /// Output file (default: the server-suggested filename).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import a JSON snapshot; existing nodes are skipped (admin).
    Import {
        /// Snapshot file produced by `labctl export`.
        file: PathBuf,
    },
    /// Account administration (admin).
    Users {
        #[command(subcommand)]
        action: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List accounts.
    List,
    /// Show one account.
    Show { username: String },
    /// Change an account's role or active flag.
    Set {
        username: String,
        #[arg(long)]
        role: Option<RoleArg>,
        #[arg(long)]
        active: Option<bool>,
    },
}

#[derive(Args)]
struct NodeFields {
    #[arg(long)]
    title: Option<String>,
    /// Read the HTML body from this file.
    #[arg(long)]
    body_file: Option<PathBuf>,
    /// Position among siblings.
    #[arg(long, allow_hyphen_values = true)]
    order: Option<i64>,
    /// Hide the node (and its subtree) from non-admins.
    #[arg(long)]
    hidden: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Exercise,
    Step,
    Reference,
    Page,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exercise => "exercise",
            Self::Step => "step",
            Self::Reference => "reference",
            Self::Page => "page",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Standard,
    Admin,
}

impl RoleArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Admin => "admin",
        }
    }
}

/// Split `kind/slug`.
fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((kind, slug)) if !kind.is_empty() && !slug.is_empty() && !slug.contains('/') => Ok((kind, slug)),
        _ => bail!("expected kind/slug, got '{key}'"),
    }
}

fn key_json(key: &str) -> Result<Value> {
    let (kind, slug) = split_key(key)?;
    Ok(json!({ "kind": kind, "slug": slug }))
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or("-")
}

fn node_line(node: &Value) {
    let hidden = node.get("visibility").and_then(Value::as_str) == Some("hidden");
    let badge = if hidden {
        format!(" {YELLOW}[hidden]{RESET}")
    } else {
        String::new()
    };
    println!(
        "  {CYAN}├─{RESET} {DIM}{:<10}{RESET} {BOLD}{}{RESET}  {}{badge}",
        str_field(node, "kind"),
        str_field(node, "slug"),
        str_field(node, "title"),
    );
}

fn print_nodes(title: &str, nodes: &Value) {
    header("📚", title);
    match nodes.as_array() {
        Some(list) if list.is_empty() => println!("  {DIM}(empty){RESET}"),
        Some(list) => list.iter().for_each(node_line),
        None => print_json(nodes),
    }
    println!();
}

fn print_node(resp: &Value) {
    let node = resp.get("node").unwrap_or(resp);
    header("📄", &format!("{}/{}", str_field(node, "kind"), str_field(node, "slug")));
    kv_line("Title", str_field(node, "title"));
    kv_line("Visibility", str_field(node, "visibility"));
    if let Some(order) = node.get("order").and_then(Value::as_i64) {
        kv_line("Order", &order.to_string());
    }
    if let Some(parent) = node.get("parent").filter(|p| !p.is_null()) {
        kv_line(
            "Parent",
            &format!("{}/{}", str_field(parent, "kind"), str_field(parent, "slug")),
        );
    }
    kv_line("Updated", str_field(node, "updated_at"));
    kv_line("Updated by", str_field(node, "updated_by"));
    if let Some(children) = resp.get("children").and_then(Value::as_array) {
        println!();
        println!("  {DIM}Children{RESET}");
        if children.is_empty() {
            println!("  {DIM}(none){RESET}");
        }
        children.iter().for_each(node_line);
    }
    println!();
}

fn print_user(user: &Value) {
    kv_line("Username", str_field(user, "username"));
    kv_line("Email", str_field(user, "email"));
    kv_line("Role", str_field(user, "role"));
    if let Some(active) = user.get("active").and_then(Value::as_bool) {
        let status = if active {
            format!("{GREEN}active{RESET}")
        } else {
            format!("{RED}inactive{RESET}")
        };
        kv_line("Status", &status);
    }
}

fn print_json(value: &Value) {
    if value.is_null() {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl Client {
    fn new(addr: String, token: Option<String>) -> Self {
        let http = reqwest::Client::new();
        let addr = addr.trim_end_matches('/').to_owned();
        Self { http, addr, token }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no token provided; run `labctl login` and set SECLAB_TOKEN"))
    }

    /// Attach the token if there is one. Reads work anonymously.
    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.with_auth(req).send().await.context("request failed")
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self.send(self.http.get(self.url(path))).await?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self.send(self.http.post(self.url(path)).json(body)).await?;
        handle_response(resp).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self.send(self.http.put(self.url(path)).json(body)).await?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self.send(self.http.delete(self.url(path))).await?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        bail!("server returned {status}: {message}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr, cli.token);

    match run(client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Health => cmd_health(&client).await,
        Commands::Register {
            username,
            email,
            password,
        } => cmd_register(&client, &username, &email, &password).await,
        Commands::Login { username, password } => cmd_login(&client, &username, &password).await,
        Commands::Whoami => cmd_whoami(&client).await,
        Commands::Passwd { current, new } => cmd_passwd(&client, &current, &new).await,
        Commands::List { under, all } => cmd_list(&client, under.as_deref(), all).await,
        Commands::Show { key } => cmd_show(&client, &key).await,
        Commands::Create {
            kind,
            slug,
            fields,
            parent,
        } => cmd_create(&client, kind, &slug, fields, parent.as_deref()).await,
        Commands::Update { key, fields, public } => cmd_update(&client, &key, fields, public).await,
        Commands::Delete { key, cascade } => cmd_delete(&client, &key, cascade).await,
        Commands::Export { output } => cmd_export(&client, output.as_deref()).await,
        Commands::Import { file } => cmd_import(&client, &file).await,
        Commands::Users { action } => cmd_users(&client, action).await,
    }
}

async fn cmd_health(client: &Client) -> Result<()> {
    let resp = client.get("/health").await?;
    header("🩺", "Server Health");
    kv_line("Status", str_field(&resp, "status"));
    kv_line("Region", str_field(&resp, "region"));
    kv_line("Version", str_field(&resp, "version"));
    println!();
    Ok(())
}

async fn cmd_register(client: &Client, username: &str, email: &str, password: &str) -> Result<()> {
    let body = json!({ "username": username, "email": email, "password": password });
    let user = client.post("/auth/register", &body).await?;
    success(&format!("Registered {username}"));
    print_user(&user);
    Ok(())
}

async fn cmd_login(client: &Client, username: &str, password: &str) -> Result<()> {
    let body = json!({ "username": username, "password": password });
    let resp = client.post("/auth/login", &body).await?;
    let token = resp
        .get("access_token")
        .and_then(Value::as_str)
        .context("login response carried no access_token")?;

    success(&format!("Logged in as {username}"));
    if let Some(user) = resp.get("user") {
        kv_line("Role", str_field(user, "role"));
    }
    kv_line("Expires", str_field(&resp, "expires_at"));
    println!();
    println!("  {DIM}export SECLAB_TOKEN={RESET}{token}");
    Ok(())
}

async fn cmd_whoami(client: &Client) -> Result<()> {
    client.require_token()?;
    let user = client.get("/auth/verify").await?;
    header("👤", "Current Account");
    print_user(&user);
    println!();
    Ok(())
}

async fn cmd_passwd(client: &Client, current: &str, new: &str) -> Result<()> {
    client.require_token()?;
    let body = json!({ "current_password": current, "new_password": new });
    client.post("/auth/password", &body).await?;
    success("Password changed");
    Ok(())
}

async fn cmd_list(client: &Client, under: Option<&str>, all: bool) -> Result<()> {
    if all {
        client.require_token()?;
        let nodes = client.get("/admin/content").await?;
        print_nodes("All Content", &nodes);
        return Ok(());
    }
    match under {
        None => {
            let nodes = client.get("/exercises").await?;
            print_nodes("Exercises", &nodes);
        }
        Some(key) => {
            let (kind, slug) = split_key(key)?;
            let resp = client.get(&format!("/content/{kind}/{slug}")).await?;
            let children = resp.get("children").cloned().unwrap_or(Value::Null);
            print_nodes(&format!("Under {kind}/{slug}"), &children);
        }
    }
    Ok(())
}

async fn cmd_show(client: &Client, key: &str) -> Result<()> {
    let (kind, slug) = split_key(key)?;
    let resp = client.get(&format!("/content/{kind}/{slug}")).await?;
    print_node(&resp);
    Ok(())
}

/// Fields shared by create and update, as a JSON object.
fn node_fields(fields: NodeFields) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    if let Some(title) = fields.title {
        body.insert("title".to_owned(), Value::String(title));
    }
    if let Some(path) = fields.body_file {
        let html = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        body.insert("body".to_owned(), Value::String(html));
    }
    if let Some(order) = fields.order {
        body.insert("order".to_owned(), Value::from(order));
    }
    if fields.hidden {
        body.insert("visibility".to_owned(), Value::from("hidden"));
    }
    Ok(body)
}

async fn cmd_create(
    client: &Client,
    kind: Kind,
    slug: &str,
    fields: NodeFields,
    parent: Option<&str>,
) -> Result<()> {
    client.require_token()?;
    if fields.title.is_none() {
        bail!("--title is required when creating a node");
    }
    let mut body = node_fields(fields)?;
    body.insert("kind".to_owned(), Value::from(kind.as_str()));
    body.insert("slug".to_owned(), Value::from(slug));
    if let Some(parent) = parent {
        body.insert("parent".to_owned(), key_json(parent)?);
    }

    let node = client.post("/admin/content", &Value::Object(body)).await?;
    success(&format!("Created {}/{slug}", kind.as_str()));
    print_node(&node);
    Ok(())
}

async fn cmd_update(client: &Client, key: &str, fields: NodeFields, public: bool) -> Result<()> {
    client.require_token()?;
    let (kind, slug) = split_key(key)?;
    let mut body = node_fields(fields)?;
    if public {
        body.insert("visibility".to_owned(), Value::from("public"));
    }
    if body.is_empty() {
        bail!("nothing to update; pass --title, --body-file, --order, --hidden or --public");
    }

    let node = client
        .put(&format!("/admin/content/{kind}/{slug}"), &Value::Object(body))
        .await?;
    success(&format!("Updated {kind}/{slug}"));
    print_node(&node);
    Ok(())
}

async fn cmd_delete(client: &Client, key: &str, cascade: bool) -> Result<()> {
    client.require_token()?;
    let (kind, slug) = split_key(key)?;
    let resp = client
        .delete(&format!("/admin/content/{kind}/{slug}?cascade={cascade}"))
        .await?;
    let deleted = resp.get("deleted").and_then(Value::as_array).map_or(0, Vec::len);
    success(&format!("Deleted {kind}/{slug} ({deleted} node(s) removed)"));
    Ok(())
}

/// Filename from `Content-Disposition: attachment; filename="..."`.
fn disposition_filename(value: &str) -> Option<&str> {
    let (_, rest) = value.split_once("filename=")?;
    let name = rest.trim().trim_matches('"');
    (!name.is_empty() && !name.contains(['/', '\\'])).then_some(name)
}

async fn cmd_export(client: &Client, output: Option<&Path>) -> Result<()> {
    client.require_token()?;
    let resp = client.send(client.http.get(client.url("/admin/export"))).await?;
    let suggested = resp
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .map(PathBuf::from);
    let snapshot = handle_response(resp).await?;

    let path = output
        .map(Path::to_path_buf)
        .or(suggested)
        .unwrap_or_else(|| PathBuf::from("seclab-export.json"));
    let text = serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?;
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;

    let count = snapshot
        .get("content_items")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    success(&format!("Exported {count} node(s) to {}", path.display()));
    Ok(())
}

async fn cmd_import(client: &Client, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let snapshot: Value = serde_json::from_str(&text).with_context(|| format!("failed to parse {}", file.display()))?;
    if !snapshot.get("content_items").is_some_and(Value::is_array) {
        bail!("{} is not a snapshot: missing content_items", file.display());
    }
    client.require_token()?;

    let report = client.post("/admin/import", &snapshot).await?;
    let count = |field: &str| report.get(field).and_then(Value::as_array).map_or(0, Vec::len);

    header("📥", "Import Report");
    kv_line("Created", &count("created").to_string());
    kv_line("Skipped (existing)", &count("skipped").to_string());
    kv_line("Failed", &count("failed").to_string());
    if let Some(failed) = report.get("failed").and_then(Value::as_array) {
        for f in failed {
            println!("  {RED}✗{RESET} {} {DIM}{}{RESET}", str_field(f, "key"), str_field(f, "reason"));
        }
    }
    println!();
    Ok(())
}

async fn cmd_users(client: &Client, action: UserCommands) -> Result<()> {
    client.require_token()?;
    match action {
        UserCommands::List => {
            let users = client.get("/admin/users").await?;
            header("👥", "Accounts");
            for user in users.as_array().into_iter().flatten() {
                let active = user.get("active").and_then(Value::as_bool).unwrap_or(false);
                let flag = if active { "" } else { " (inactive)" };
                println!(
                    "  {CYAN}├─{RESET} {BOLD}{}{RESET} {DIM}{}{RESET} {}{flag}",
                    str_field(user, "username"),
                    str_field(user, "email"),
                    str_field(user, "role"),
                );
            }
            println!();
        }
        UserCommands::Show { username } => {
            let user = client.get(&format!("/admin/users/{username}")).await?;
            print_user(&user);
        }
        UserCommands::Set { username, role, active } => {
            let mut body = Map::new();
            if let Some(role) = role {
                body.insert("role".to_owned(), Value::from(role.as_str()));
            }
            if let Some(active) = active {
                body.insert("active".to_owned(), Value::Bool(active));
            }
            if body.is_empty() {
                bail!("nothing to update; pass --role or --active");
            }
            let user = client.put(&format!("/admin/users/{username}"), &Value::Object(body)).await?;
            success(&format!("Updated {username}; takes effect at next login"));
            print_user(&user);
        }
    }
    Ok(())
}
