//! rusthpsdr: discover a radio, bring the engines up, and run.
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use rusthpsdr::discovery::{self, DiscoveryConfig, Protocol};
use rusthpsdr::props::{self, Properties};
use rusthpsdr::radio::{StateStore, UiEvent};
use rusthpsdr::server::{LISTEN_PORT, RemoteServer};
use rusthpsdr::{protocol1, protocol2};

const FIRMWARE_NOTE: &str = "\
Compatible firmware:
  Protocol 1 radios: Metis/Hermes/Angelia/Orion(2) v2.9 and up,
    HermesLite v1/v2 (gateware 40+ reports as V2), STEMlab
  Protocol 2 radios: firmware 3.8 and up, Saturn/G2";

#[derive(Debug, Parser)]
#[command(
    name = "rusthpsdr",
    disable_version_flag = true,
    about = "Control and remote operation for HPSDR software defined radios"
)]
struct Opt {
    /// Print version and firmware compatibility information, then
    /// exit.
    #[arg(short = 'V')]
    version: bool,

    /// Open the debug-only action test menu.
    #[arg(long = "TestMenu")]
    test_menu: bool,

    /// Increase verbosity; repeat for more.
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn props_path() -> PathBuf {
    workdir().join("rusthpsdr.props")
}

#[cfg(target_os = "macos")]
fn workdir() -> PathBuf {
    // Keep state under Application Support; the app bundle's own
    // directory is read-only. (The display-sleep power assertion is
    // taken by the bundle wrapper.)
    let dir = std::env::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Library/Application Support/rusthpsdr");
    let _ = std::fs::create_dir_all(&dir);
    let _ = std::env::set_current_dir(&dir);
    dir
}

#[cfg(not(target_os = "macos"))]
fn workdir() -> PathBuf {
    PathBuf::from(".")
}

fn test_menu(store: &Arc<StateStore>) -> Result<()> {
    // Fire one of everything that has no hardware side effect, so a
    // misconfigured build shows up before a radio is attached.
    println!("action test:");
    for (name, r) in [
        ("band select", store.select_band(0, rusthpsdr::band::band_id::BAND_40)),
        ("bandstack", store.bandstack_next(0)),
        ("mode change", store.mode_changed(0)),
        ("memory store", store.store_memory(0)),
        ("memory recall", store.recall_memory(0)),
        ("keyer speed", store.keyer_speed_changed(25)),
    ] {
        match r {
            Ok(()) => println!("  {name}: ok"),
            Err(e) => println!("  {name}: FAILED: {e}"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // The one non-standard flag spelling kept for compatibility with
    // existing muscle memory: "-TestMenu".
    let args = std::env::args().map(|a| {
        if a == "-TestMenu" {
            "--TestMenu".to_string()
        } else {
            a
        }
    });
    let opt = Opt::parse_from(args);

    if opt.version {
        println!("rusthpsdr {}", env!("CARGO_PKG_VERSION"));
        println!("{FIRMWARE_NOTE}");
        return Ok(());
    }

    stderrlog::new()
        .module(module_path!())
        .module("rusthpsdr")
        .quiet(false)
        .verbosity(usize::from(opt.verbose) + 2)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let _dir = workdir();
    let propsfile = props_path();
    let saved = Properties::load(&propsfile)?;

    let mut cfg = DiscoveryConfig::default();
    let target = saved.get_str("radio.target", "");
    if !target.is_empty() {
        cfg.target = target.parse().ok();
        cfg.enable_tcp = saved.get_bool("radio.tcp", false);
    }
    let found = discovery::discover(&cfg)?;
    let Some(radio) = found.into_iter().find(discovery::Discovered::startable) else {
        warn!("no startable radio found");
        return Ok(());
    };
    info!("using {} at {}", radio.name, radio.address);

    let protocol = radio.protocol;
    let store = StateStore::new(radio);
    props::restore_state(&store, &propsfile)?;

    if opt.test_menu {
        return test_menu(&store);
    }

    let (ui_tx, ui_rx) = std::sync::mpsc::channel::<UiEvent>();
    store.set_ui(ui_tx);

    match protocol {
        Protocol::P1 => {
            let engine = protocol1::Protocol1::new(Arc::clone(&store))?;
            store.set_wire(engine.clone());
            store.set_speaker(engine.clone());
            engine.start()?;
        }
        Protocol::P2 => {
            let engine = protocol2::Protocol2::new(Arc::clone(&store))?;
            store.set_wire(engine.clone());
            store.set_speaker(engine.clone());
            engine.start()?;
        }
        Protocol::Soapy => {
            #[cfg(feature = "soapysdr")]
            {
                let adapter =
                    rusthpsdr::soapy::SoapyAdapter::new(Arc::clone(&store), "")?;
                store.set_wire(adapter.clone());
                store.set_speaker(adapter.clone());
                adapter.start()?;
            }
            #[cfg(not(feature = "soapysdr"))]
            anyhow::bail!("built without soapysdr support");
        }
    }
    for rx in &store.receivers {
        rx.start()?;
        rx.displaying.store(true, Ordering::Relaxed);
    }

    if saved.get_bool("server.enabled", false) {
        let password = saved.get_str("server.password", "");
        let port = saved.get_i64("server.port", i64::from(LISTEN_PORT)) as u16;
        let server = RemoteServer::new(Arc::clone(&store), &password, port);
        server.listen()?;
    }

    // The UI task: the single sink for display updates. Headless, it
    // just drains events; dialogs starting with "FATAL" exit.
    for ev in ui_rx {
        match ev {
            UiEvent::Dialog(msg) if msg.starts_with("FATAL") => {
                eprintln!("{msg}");
                break;
            }
            UiEvent::Dialog(msg) => eprintln!("{msg}"),
            UiEvent::Redraw(_) | UiEvent::VfoChanged => {}
        }
    }

    props::save_state(&store, &propsfile)?;
    Ok(())
}
/* vim: textwidth=80
 */
