use crate::error::PipelineError;
use crate::runner::CommandRunner;
use crate::toolchain::Toolchain;
use log::warn;

/// Serial numbers from `adb devices` output, in listed order.
pub fn parse_devices(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// The device a build installs to, plus any others that were attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChoice {
    pub serial: String,
    pub skipped: Vec<String>,
}

impl DeviceChoice {
    pub fn is_ambiguous(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// First listed device wins.
pub fn pick_device(devices: Vec<String>) -> Result<DeviceChoice, PipelineError> {
    let mut devices = devices.into_iter();
    let serial = devices.next().ok_or(PipelineError::NoDevice)?;
    Ok(DeviceChoice {
        serial,
        skipped: devices.collect(),
    })
}

pub async fn select_device<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    step: &str,
) -> Result<String, PipelineError> {
    let output = tools.run(step, &tools.list_devices_invocation()).await?;
    let choice = pick_device(parse_devices(&output.stdout))?;
    if choice.is_ambiguous() {
        warn!(
            "Multiple devices detected. Using {}, ignoring {}.",
            choice.serial,
            choice.skipped.join(", ")
        );
    }
    Ok(choice.serial)
}
