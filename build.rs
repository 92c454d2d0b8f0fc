//! Build script for strelka-frontend
//!
//! Generates tonic server bindings for the frontend and health protos.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/strelka.proto");
    println!("cargo:rerun-if-changed=proto/health.proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .compile_protos(&["proto/strelka.proto", "proto/health.proto"], &["proto"])?;

    Ok(())
}
