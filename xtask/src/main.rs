//! Automation for the schema-pool workspace.
//!
//! Run with `cargo xtask <command>`:
//!
//! - `ci`: formatting check, clippy, tests, docs
//! - `fmt [--fix]`
//! - `clippy [--fix]`
//! - `test [-p <package>] [--integration]`
//! - `doc [--open]`

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Crate whose ignored tests talk to a live PostgreSQL server.
const POSTGRES_PACKAGE: &str = "schema-pool-postgres";

/// Variable those tests read the server DSN from.
const POSTGRES_DSN_VAR: &str = "PG_DSN";

#[derive(Parser)]
#[command(name = "xtask", about = "Automation for schema-pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Everything CI runs
    Ci,
    /// Check formatting, or apply it with --fix
    Fmt {
        #[arg(long)]
        fix: bool,
    },
    /// Lint all targets, or apply suggestions with --fix
    Clippy {
        #[arg(long)]
        fix: bool,
    },
    /// Run the test suites
    Test {
        /// Only this package
        #[arg(short, long)]
        package: Option<String>,
        /// Also run the PostgreSQL tests (needs PG_DSN)
        #[arg(long)]
        integration: bool,
    },
    /// Build the API docs
    Doc {
        #[arg(long)]
        open: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            fmt(&sh, false)?;
            clippy(&sh, false)?;
            test(&sh, None, false)?;
            doc(&sh, false)?;
            println!("\n✅ ci passed");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy { fix } => clippy(&sh, fix)?,
        Command::Test {
            package,
            integration,
        } => test(&sh, package.as_deref(), integration)?,
        Command::Doc { open } => doc(&sh, open)?,
    }

    Ok(())
}

/// Directory holding the workspace `Cargo.toml`.
fn workspace_root() -> Result<PathBuf> {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .map(PathBuf::from)
        .context("xtask must live one level below the workspace root")
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    let check: &[&str] = if fix { &[] } else { &["--", "--check"] };
    println!("==> cargo fmt{}", if fix { "" } else { " --check" });
    cmd!(sh, "cargo fmt --all {check...}").run()?;
    Ok(())
}

fn clippy(sh: &Shell, fix: bool) -> Result<()> {
    let mode: &[&str] = if fix {
        &["--fix", "--allow-dirty"]
    } else {
        &["--", "-D", "warnings"]
    };
    println!("==> cargo clippy");
    cmd!(sh, "cargo clippy --workspace --all-features --all-targets {mode...}").run()?;
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>, integration: bool) -> Result<()> {
    let scope: Vec<&str> = match package {
        Some(pkg) => vec!["-p", pkg],
        None => vec!["--workspace"],
    };
    println!("==> cargo test");
    cmd!(sh, "cargo test --all-features {scope...}").run()?;

    if integration {
        if sh.var_os(POSTGRES_DSN_VAR).is_none() {
            bail!("set {POSTGRES_DSN_VAR} to run the PostgreSQL tests");
        }
        println!("==> PostgreSQL tests");
        cmd!(sh, "cargo test -p {POSTGRES_PACKAGE} --test integration -- --ignored").run()?;
    }
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    let open = open.then_some("--open");
    println!("==> cargo doc");
    cmd!(sh, "cargo doc --workspace --all-features --no-deps {open...}").run()?;
    Ok(())
}
