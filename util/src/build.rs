macro_rules! env_or_none {
    ($name:ident, $env:literal) => {
        #[allow(dead_code)]
        pub const $name: &str = match option_env!($env) {
            Some(val) => val,
            None => "<none>",
        };
    };
}

pub const PACKAGE: &str = "ipscgate";
env_or_none!(VERSION, "VERGEN_BUILD_SEMVER");
env_or_none!(BUILD_TIMESTAMP, "VERGEN_BUILD_TIMESTAMP");
env_or_none!(RUSTC_VERSION, "VERGEN_RUSTC_SEMVER");
