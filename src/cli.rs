use crate::config::StudioConfigOverrides;
use crate::model::ObjectId;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSelector {
    Id(ObjectId),
    Name(String),
}

impl StageSelector {
    fn parse(value: &str) -> Self {
        match value.parse::<ObjectId>() {
            Ok(id) => StageSelector::Id(id),
            Err(_) => StageSelector::Name(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewArgs {
    pub project: Option<PathBuf>,
    pub stage: Option<StageSelector>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub frames: Option<u32>,
    pub frame_rate: Option<u32>,
    pub help: bool,
}

impl PreviewArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = PreviewArgs::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if flag == "--help" || flag == "-h" {
                parsed.help = true;
                continue;
            }
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --project/--stage with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "project" => parsed.project = Some(PathBuf::from(value)),
                "stage" => parsed.stage = Some(StageSelector::parse(&value)),
                "config" => parsed.config = Some(PathBuf::from(value)),
                "output" => parsed.output = Some(PathBuf::from(value)),
                "frames" => {
                    parsed.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "frame-rate" => {
                    let rate = value.parse::<u32>().with_context(|| format!("Invalid frame rate '{value}'"))?;
                    if rate == 0 {
                        bail!("Frame rate must be at least 1");
                    }
                    parsed.frame_rate = Some(rate);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --project, --stage, --config, --output, --frames, \
                     --frame-rate."
                ),
            }
        }
        Ok(parsed)
    }

    pub fn config_overrides(&self) -> StudioConfigOverrides {
        StudioConfigOverrides { max_history: None, frames: self.frames, frame_rate: self.frame_rate }
    }

    pub fn usage() -> &'static str {
        "Usage: stage_preview --project <project.json> --stage <name|id> [--frames N] [--frame-rate N] \
         [--config <config.json>] [--output <report.json>]"
    }
}
