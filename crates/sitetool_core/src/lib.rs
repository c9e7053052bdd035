pub mod build;
pub mod config;
pub mod covers;
pub mod discography;
pub mod dist;
pub mod extract;
pub mod http;
pub mod links;
pub mod quality;
pub mod report;
pub mod resize;
pub mod runtime;
pub mod upscale;

/// UTC wall-clock time as `YYYY-MM-DDTHH:MM:SSZ`, the `updatedAt` format of every JSON output.
pub(crate) fn utc_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
