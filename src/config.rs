use crate::backoff::{ExponentialBackoff, FixedBackoff, RetryPolicy};
use crate::client::DEFAULT_SERVICE_URL;
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for the exponential delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Process images using a background segmentation microservice.",
    long_about = None
)]
pub struct Config {
    /// Folder containing the input images (.png, .jpg, .jpeg).
    #[arg(short, long)]
    pub input_dir: PathBuf,

    /// Folder receiving `resized_images/` and `masks/`.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Endpoint of the segmentation microservice.
    #[arg(
        short = 'u',
        long,
        env = "MATTE_SERVICE_URL",
        default_value = DEFAULT_SERVICE_URL,
        value_parser = check_url
    )]
    pub service_url: Url,

    #[arg(short, long, default_value_t = 2, value_parser = check_positive)]
    pub workers: usize,

    /// Attempts per image before giving up.
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: u32,

    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Double the delay after each failed attempt instead of keeping it fixed.
    #[arg(long)]
    pub exponential_backoff: bool,

    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    #[arg(long)]
    pub no_progress: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.exponential_backoff {
            RetryPolicy::new(
                self.retries,
                ExponentialBackoff::new(self.retry_delay(), MAX_BACKOFF),
            )
        } else {
            RetryPolicy::new(self.retries, FixedBackoff::new(self.retry_delay()))
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn check_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("{s} is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme `{other}`, expected http or https")),
    }
}

fn check_positive(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{s} is not a number: {e}"))?;
    if n == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Config, clap::Error> {
        let mut args = vec!["matte-pipeline", "-i", "in", "-o", "out"];
        args.extend_from_slice(extra);
        Config::try_parse_from(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.input_dir, PathBuf::from("in"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.jpeg_quality, 95);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
    }

    #[test]
    fn test_input_and_output_are_required() {
        assert!(Config::try_parse_from(["matte-pipeline", "-i", "in"]).is_err());
        assert!(Config::try_parse_from(["matte-pipeline", "-o", "out"]).is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(parse(&["--workers", "0"]).is_err());
        assert!(parse(&["--retries", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "101"]).is_err());
        assert!(parse(&["--service-url", "ftp://host/seg"]).is_err());
        assert!(parse(&["--service-url", "not a url"]).is_err());
    }

    #[test]
    fn test_exponential_policy() {
        let config = parse(&["--exponential-backoff", "--retry-delay-ms", "250"]).unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_custom_service_url() {
        let config = parse(&["-u", "https://seg.example.com/u2net"]).unwrap();
        assert_eq!(config.service_url.as_str(), "https://seg.example.com/u2net");
    }
}
