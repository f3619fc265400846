use std::time::Instant;

const SHIM_SOURCES: &[&str] = &["csrc/generic_trampoline.c"];

fn main() {
    let build_start = Instant::now();

    println!("cargo:rerun-if-changed=build.rs");
    for source in SHIM_SOURCES {
        println!("cargo:rerun-if-changed={}", source);
    }

    let mut build = cc::Build::new();
    configure_build_defines(&mut build);
    for source in SHIM_SOURCES {
        build.file(source);
    }
    build.compile("xml_error_bridge_shim");

    println!(
        "cargo:warning=Generic-error shim built in {:.2}s",
        build_start.elapsed().as_secs_f64()
    );
}

fn configure_build_defines(build: &mut cc::Build) {
    build.warnings(true);
    build.flag_if_supported("-Wno-format-nonliteral");
    // Position-independent so the shim can land in a cdylib consumer.
    build.pic(true);

    if cfg!(target_os = "windows") {
        build.define("WIN32", None);
    } else {
        build.define("_DEFAULT_SOURCE", None);
    }
}
