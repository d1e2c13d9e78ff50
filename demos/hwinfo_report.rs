//! Print the hardware descriptor of this machine.
//!
//! ```text
//! RUST_LOG=debug cargo run --example hwinfo_report
//! PERFKERN_DISABLE_ISA=avx2 cargo run --example hwinfo_report
//! ```

use perfkern::{DetectionConfig, HwInfoError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match DetectionConfig::from_env() {
        Ok(cfg) if !cfg.is_default() => log::info!("overrides: {cfg}"),
        Ok(_) => {}
        Err(e) => log::warn!("{e}"),
    }

    match perfkern::initialize() {
        Ok(_) => {}
        Err(HwInfoError::UnsupportedHardware) => {
            log::warn!("kernels are not supported on this machine");
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(hw) = perfkern::hardware_info() {
        println!("{}", serde_json::to_string_pretty(hw)?);
    }
    perfkern::deinitialize()?;
    Ok(())
}
