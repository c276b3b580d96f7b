//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    EmitBuilder::builder()
        .fail_on_error()
        .all_build()
        .all_cargo()
        .emit()?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
