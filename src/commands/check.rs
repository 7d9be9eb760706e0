//! Check command implementation.

use crate::config::{validate_effective_config, Config};
use crate::provider::{Liveness, MetricProvider, ProcessProbe};
use crate::system::{OsProbe, SysinfoProvider};

/// Validates provider access, signal capability and configuration.
pub async fn command_check(
    provider: bool,
    signals: bool,
    all: bool,
    config: &Config,
) -> anyhow::Result<()> {
    println!("🔍 hostpulse - System Check");
    println!("===========================");

    let mut all_ok = true;

    if provider || all {
        println!("\n📊 Checking telemetry provider...");
        let collector = SysinfoProvider::new();

        match collector.cpu().await {
            Ok(cpu) => println!("   ✅ CPU query: {} cores", cpu.per_core.len()),
            Err(e) => {
                println!("   ❌ CPU query failed: {e}");
                all_ok = false;
            }
        }
        match collector.memory().await {
            Ok(mem) => println!(
                "   ✅ Memory query: {} MB total",
                mem.total / 1024 / 1024
            ),
            Err(e) => {
                println!("   ❌ Memory query failed: {e}");
                all_ok = false;
            }
        }
        match collector.disks().await {
            Ok(disks) => println!("   ✅ Disk query: {} filesystems", disks.len()),
            Err(e) => {
                println!("   ❌ Disk query failed: {e}");
                all_ok = false;
            }
        }
        match collector.processes().await {
            Ok(table) => {
                if table.is_empty() {
                    println!("   ❌ Process table is empty");
                    all_ok = false;
                } else {
                    println!("   ✅ Process table: {} entries", table.len());
                }
            }
            Err(e) => {
                println!("   ❌ Process table failed: {e}");
                all_ok = false;
            }
        }
    }

    if signals || all {
        println!("\n📡 Checking signal capability...");
        let probe = OsProbe;
        match probe.liveness(std::process::id()) {
            Liveness::Exists => println!("   ✅ Zero-effect signal works"),
            other => {
                println!("   ❌ Liveness probe of own pid returned {other:?}");
                all_ok = false;
            }
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {e}");
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
