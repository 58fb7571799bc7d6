use anyhow::{Context, Result};
use codegrade_engine::{EngineConfig, GradingPool};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::generator;

/// Exit code for a submission that passed every test case
pub const EXIT_CORRECT: i32 = 0;
/// Exit code for a compile failure or any failing test case
pub const EXIT_NOT_CORRECT: i32 = 1;
/// Exit code when the engine itself is unusable
pub const EXIT_INTERNAL_ERROR: i32 = 2;

/// Explicit file if given, otherwise the same lookup the API uses
fn load_config(config_path: Option<&str>) -> Result<EngineConfig> {
    match config_path {
        Some(path) => {
            let mut config = EngineConfig::load(Path::new(path))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => EngineConfig::load_default(),
    }
}

/// Grade a local source file; returns the process exit code
pub async fn run_submission(
    source_path: &str,
    tests_path: Option<&str>,
    config_path: Option<&str>,
    json: bool,
) -> Result<i32> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read source file: {}", source_path))?;
    let spec = match tests_path {
        Some(path) => Some(
            fs::read_to_string(path).with_context(|| format!("Failed to read test file: {}", path))?,
        ),
        None => None,
    };

    let config = load_config(config_path)?;
    let pool = GradingPool::from_config(&config);
    debug!(source = source_path, tests = ?tests_path, "Grading submission");

    let evaluation = match pool.evaluate(&source, spec.as_deref()).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            eprintln!("❌ {}: {}", e.kind(), e);
            eprintln!("\n💡 Check the toolchain with: codegrade-cli check");
            return Ok(EXIT_INTERNAL_ERROR);
        }
    };

    if json {
        let text = serde_json::to_string_pretty(&evaluation).context("Failed to serialize report")?;
        println!("{}", text);
    } else {
        print!("{}", generator::render_summary(&evaluation));
    }

    Ok(if evaluation.overall_correct() {
        EXIT_CORRECT
    } else {
        EXIT_NOT_CORRECT
    })
}

/// Print the effective configuration and probe the toolchain
pub async fn check_toolchain(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("📋 Effective configuration:\n");
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();

    let pool = GradingPool::from_config(&config);
    match pool.engine().probe().await {
        Ok(version) => {
            println!("✅ Toolchain available: {}", version);
            Ok(())
        }
        Err(e) => {
            println!("❌ Toolchain unavailable: {}", e);
            anyhow::bail!("toolchain check failed")
        }
    }
}

/// Initialize a grading project
pub fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing grading project at: {}", path);

    let project_path = Path::new(path);

    for dir in ["config", "tests"] {
        fs::create_dir_all(project_path.join(dir))
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    let config_file = project_path.join("config/engine.json");
    if config_file.exists() {
        println!("  ⏭️  Kept existing: config/engine.json");
    } else {
        fs::write(&config_file, generator::default_config_json()?)
            .context("Failed to write config/engine.json")?;
        println!("  ✅ Created: config/engine.json");
    }

    let test_file = project_path.join("tests/hello_world.json");
    if test_file.exists() {
        println!("  ⏭️  Kept existing: tests/hello_world.json");
    } else {
        fs::write(&test_file, generator::hello_world_tests_json())
            .context("Failed to write tests/hello_world.json")?;
        println!("  ✅ Created: tests/hello_world.json");
    }

    let source_file = project_path.join("hello.c");
    if !source_file.exists() {
        fs::write(&source_file, generator::HELLO_WORLD_SOURCE).context("Failed to write hello.c")?;
        println!("  ✅ Created: hello.c");
    }

    println!("✅ Project initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Check the toolchain: codegrade-cli check");
    println!("  2. Grade the sample: codegrade-cli run --source hello.c --tests tests/hello_world.json");

    Ok(())
}

/// Write (or print) a one-case test file
pub fn new_test(expected: &str, input: &str, output: Option<&str>) -> Result<()> {
    let json = codegrade_engine::testcase::simple_test_case_json(expected, input);

    match output {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, &json).with_context(|| format!("Failed to write {}", path))?;
            println!("✅ Test case written to {}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
