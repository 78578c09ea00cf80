pub const CDRSEEK_DISPLAY_VERSION: &str = env!("CDRSEEK_DISPLAY_VERSION");
pub const CDRSEEK_BUILD_N: &str = env!("CDRSEEK_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "cdrseek {}\nBuild {}\nQuery search across antibody sequences and their CDR/FR regions",
        CDRSEEK_DISPLAY_VERSION, CDRSEEK_BUILD_N
    )
}
