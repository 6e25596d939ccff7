// Emits VERGEN_BUILD_TIMESTAMP and VERGEN_CARGO_TARGET_TRIPLE for the startup log.
fn main() {
    use vergen::{BuildBuilder, CargoBuilder, Emitter};

    println!("cargo:rerun-if-changed=build.rs");

    let mut emitter = Emitter::default();

    if let Ok(build) = BuildBuilder::all_build() {
        let _ = emitter.add_instructions(&build);
    }
    if let Ok(cargo) = CargoBuilder::all_cargo() {
        let _ = emitter.add_instructions(&cargo);
    }

    if let Err(e) = emitter.emit() {
        eprintln!("vergen emit skipped: {e}");
    }
}
