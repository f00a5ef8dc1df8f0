// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    // Vendor libraries are usually installed outside the default search path.
    if let Ok(dir) = std::env::var("SIGNAL_HOUND_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", dir);
    }
    println!("cargo:rerun-if-env-changed=SIGNAL_HOUND_LIB_DIR");

    #[cfg(feature = "bb")]
    {
        println!("cargo:rustc-link-lib=bb_api");
    }

    #[cfg(feature = "sp")]
    {
        println!("cargo:rustc-link-lib=sp_api");
    }

    #[cfg(feature = "sm")]
    {
        println!("cargo:rustc-link-lib=sm_api");
    }

    #[cfg(feature = "vsg")]
    {
        println!("cargo:rustc-link-lib=vsg_api");
    }
}
