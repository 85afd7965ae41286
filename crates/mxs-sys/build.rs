fn main() {
    // Only build the external engine when the `cpp` feature is enabled.
    #[cfg(feature = "cpp")]
    {
        use std::env;

        let engine_src = env::var("MXS_ENGINE_SRC").unwrap_or_else(|_| "../../engine".to_string());

        let dst = cmake::Config::new(&engine_src)
            .define("CMAKE_BUILD_TYPE", "Release")
            .build();

        println!(
            "cargo:rustc-link-search=native={}",
            dst.join("lib").display()
        );
        println!("cargo:rustc-link-lib=static=mxs_capi");

        #[cfg(target_os = "macos")]
        println!("cargo:rustc-link-lib=c++");
        #[cfg(target_os = "linux")]
        println!("cargo:rustc-link-lib=stdc++");

        println!("cargo:rerun-if-env-changed=MXS_ENGINE_SRC");
    }
}
