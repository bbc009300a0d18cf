//! `riotscope`: list the threads of a halted RIOT target and decode the
//! registers each one saved on its stack.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use probe_rs::config::TargetSelector;
use probe_rs::probe::list::Lister;
use probe_rs::Permissions;
use riotscope_core::symbols::resolve_requirements;
use riotscope_core::{
    detect_rtos, ArchitectureVariant, RegisterSet, Riot, RtosAware, SchedulerSnapshot,
    SymbolManager, SymbolRequirement, TargetMemory, ThreadId,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Firmware ELF the target is running
    #[arg(short, long)]
    elf: PathBuf,

    /// Target chip name, or "auto" to let probe-rs detect it
    #[arg(long, default_value = "auto")]
    chip: String,

    /// Index of probe to use (default: 0)
    #[arg(long, default_value_t = 0)]
    probe_index: usize,

    /// Core family to assume instead of the detected one (e.g. cortex-m0, cortex-m4)
    #[arg(long)]
    arch: Option<ArchitectureVariant>,

    /// Halt the core for the read and resume it afterwards
    #[arg(long)]
    halt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Show which thread-awareness symbols the ELF provides
    Symbols,
    #[command(flatten)]
    Target(TargetCommand),
}

/// Commands that read the attached target.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum TargetCommand {
    /// List threads
    Threads {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the saved registers of one thread
    Regs {
        /// Thread id (PID)
        thread_id: ThreadId,
        /// Print as a GDB `g` packet payload
        #[arg(long, conflicts_with = "json")]
        gdb: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_symbols(resolved: &[SymbolRequirement]) {
    for sym in resolved {
        let kind = if sym.required { "required" } else { "optional" };
        match sym.resolved() {
            Some(addr) => println!("{:<20} {kind:<8} 0x{addr:08X}", sym.name),
            None => println!("{:<20} {kind:<8} missing", sym.name),
        }
    }
}

fn print_threads(snapshot: &SchedulerSnapshot) {
    println!(
        "Active thread: {} ({} live of {} slots, scheduler reports {})",
        snapshot.active_thread,
        snapshot.threads.len(),
        snapshot.max_threads,
        snapshot.reported_thread_count
    );
    println!("  {:>4}  {:<16} NAME", "PID", "STATE");
    for thread in &snapshot.threads {
        let marker = if thread.thread_id == snapshot.active_thread { '*' } else { ' ' };
        println!("{marker} {:>4}  {:<16} {}", thread.thread_id, thread.state, thread.name);
    }
}

fn print_registers(regs: &RegisterSet) {
    for reg in regs.iter() {
        let digits = usize::from(reg.bits / 4);
        println!("{:>5}: 0x{:0digits$X}", reg.name, reg.value);
    }
}

fn run(
    command: &TargetCommand,
    rtos: &mut dyn RtosAware,
    memory: &mut dyn TargetMemory,
) -> Result<()> {
    match command {
        TargetCommand::Threads { json } => {
            let snapshot = rtos.update_threads(memory).context("Failed to read scheduler state")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(snapshot)?);
            } else {
                print_threads(snapshot);
            }
        }
        TargetCommand::Regs { thread_id, gdb, json } => {
            let regs = rtos
                .thread_registers(memory, *thread_id)
                .with_context(|| format!("Failed to decode registers of thread {thread_id}"))?;
            if *gdb {
                println!("{}", regs.to_gdb_hex());
            } else if *json {
                println!("{}", serde_json::to_string_pretty(&regs)?);
            } else {
                print_registers(&regs);
            }
        }
    }
    Ok(())
}

/// Combine the command outcome with the outcome of resuming the core. A
/// command error wins; a resume failure alongside it is only logged.
fn settle<E>(result: Result<()>, resumed: std::result::Result<(), E>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match (result, resumed) {
        (result, Ok(())) => result,
        (Ok(()), Err(e)) => Err(e).context("Failed to resume core"),
        (Err(failed), Err(e)) => {
            error!("Failed to resume core: {e}");
            Err(failed)
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut symbols = SymbolManager::new();
    symbols.load_elf(&cli.elf)?;
    let resolved = resolve_requirements(Riot::symbol_list(), &symbols);

    let command = match &cli.command {
        Commands::Symbols => {
            print_symbols(&resolved);
            return Ok(());
        }
        Commands::Target(command) => command,
    };
    if !Riot::detect(&symbols) {
        bail!("{} does not look like a RIOT firmware (no `sched_threads`)", cli.elf.display());
    }

    let lister = Lister::new();
    let probes = lister.list_all();
    let probe_info = probes.get(cli.probe_index).context("Probe index out of range")?;
    let probe = probe_info.open().context("Failed to open probe")?;
    info!("Opened probe: {}", probe_info.identifier);

    let selector = if cli.chip.eq_ignore_ascii_case("auto") {
        TargetSelector::Auto
    } else {
        TargetSelector::from(cli.chip.as_str())
    };
    let mut session = probe
        .attach(selector, Permissions::default())
        .context("Failed to attach to target")?;
    info!("Attached to {}", session.target().name);
    let mut core = session.core(0).context("Failed to access core 0")?;

    let variant = match cli.arch {
        Some(variant) => variant,
        None => ArchitectureVariant::try_from(core.core_type())?,
    };
    let mut rtos = detect_rtos(&symbols, variant)?.context("No supported RTOS detected")?;
    info!("Using {} profile for {variant}", rtos.name());

    let halted_here = if core.core_halted().context("Failed to get core status")? {
        false
    } else if cli.halt {
        core.halt(Duration::from_millis(100)).context("Failed to halt core")?;
        true
    } else {
        bail!("Core is running; halt it first or pass --halt");
    };

    let result = run(command, rtos.as_mut(), &mut core);

    if halted_here {
        return settle(result, core.run());
    }
    result
}
