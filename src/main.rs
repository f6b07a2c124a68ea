use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{load_yaml, App, ArgMatches};
use log::info;

use rpsx_jit::psx::jit::JitConfig;
use rpsx_jit::psx::System;

/// Where the BIOS hands over to the shell; sideloaded executables start here.
const SHELL_ENTRY: u32 = 0x8003_0000;
const SHELL_TIMEOUT_FRAMES: u64 = 600;

pub struct Options {
    bios: String,
    exe: Option<String>,
    frames: Option<u64>,

    load_state: Option<String>,
    save_state: Option<String>,

    config: JitConfig,
}

fn parse<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value.parse()
            .map(Some)
            .map_err(|_| anyhow!("invalid value '{}' for --{}", value, name)),
        None => Ok(None),
    }
}

impl Options {
    fn from_matches(matches: &ArgMatches) -> Result<Options> {
        let mut config = JitConfig::default();

        if let Some(mib) = parse::<usize>(matches, "arena-size")? {
            config.arena_bytes = mib * 1024 * 1024;
        }

        if let Some(max) = parse::<u32>(matches, "max-block")? {
            config.max_block_instructions = max;
        }

        config.validate_checksums = matches.is_present("validate-blocks");

        Ok(Options {
            bios: matches.value_of("BIOS").unwrap_or_default().to_string(),
            exe: matches.value_of("exe").map(String::from),
            frames: parse(matches, "frames")?,

            load_state: matches.value_of("load-state").map(String::from),
            save_state: matches.value_of("save-state").map(String::from),

            config: config,
        })
    }
}

fn sideload(system: &mut System, exe: &str) -> Result<()> {
    let limit = system.scheduler().now() + SHELL_TIMEOUT_FRAMES * rpsx_jit::psx::CYCLES_PER_FRAME;

    while system.cpu().pc() != SHELL_ENTRY {
        if system.scheduler().now() >= limit {
            return Err(anyhow!("BIOS never reached the shell at 0x{:08x}", SHELL_ENTRY));
        }

        system.step_block();
    }

    system.load_psexe(exe).with_context(|| format!("unable to load {}", exe))
}

fn main() -> Result<()> {
    env_logger::init();

    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml).get_matches();
    let options = Options::from_matches(&matches)?;

    let mut system = System::from_bios_file(&options.bios, options.config.clone())
        .with_context(|| format!("unable to start with BIOS {}", options.bios))?;

    system.bus_mut().attach_open_bus();

    if let Some(path) = &options.load_state {
        system.load_state(path).with_context(|| format!("unable to load state {}", path))?;
    }

    if let Some(exe) = &options.exe {
        sideload(&mut system, exe)?;
    }

    loop {
        if let Some(frames) = options.frames {
            if system.frames() >= frames {
                break;
            }
        }

        system.run_frame();
    }

    let stats = system.stats();

    info!("[JIT] {} blocks compiled, {} cache hits, {} stub entries, {} arena resets, {} invalidations",
          stats.blocks_compiled, stats.cache_hits, stats.stub_entries,
          stats.arena_resets, stats.invalidations);

    if let Some(path) = &options.save_state {
        system.save_state(path).with_context(|| format!("unable to save state {}", path))?;
    }

    Ok(())
}
