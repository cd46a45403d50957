// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Derived views over a [`CapabilityData`] record.

use tracing::debug;

use super::{
    data::CapabilityData,
    range::{Range, Size, div_ceil},
};
use crate::{Error, Result};

const DEFAULT_FRAME_RATE: Range = Range { min: 1, max: 30 };
const MIN_BLOCK_SIZE: i32 = 2;

/// Treats absent or zero-bounded ranges as "not advertised" and substitutes `default`.
fn or_default(range: Option<Range>, default: Range) -> Range {
    match range {
        Some(range) if range.min != 0 && range.max != 0 => range,
        _ => default,
    }
}

/// Video codec view with block-based resolution and frame-rate helpers.
#[derive(Debug, Clone)]
pub struct VideoCaps<'a> {
    data: &'a CapabilityData,
    block: Size,
    width: Range,
    height: Range,
    frame_rate: Range,
    block_per_frame: Range,
    block_per_second: Range,
}

impl<'a> VideoCaps<'a> {
    /// Wraps a video record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] for audio records.
    pub fn new(data: &'a CapabilityData) -> Result<Self> {
        if !data.codec_type.is_video() {
            return Err(Error::IllegalArgument(format!(
                "\"{}\" is not a video codec",
                data.codec_name
            )));
        }
        let block = match data.block_size {
            Some(size) if size.width > 0 && size.height > 0 => size,
            _ => Size::new(MIN_BLOCK_SIZE, MIN_BLOCK_SIZE),
        };
        Ok(Self {
            data,
            block,
            width: or_default(data.width, Range::POSITIVE),
            height: or_default(data.height, Range::POSITIVE),
            frame_rate: or_default(data.frame_rate, DEFAULT_FRAME_RATE),
            block_per_frame: or_default(data.block_per_frame, Range::POSITIVE),
            block_per_second: or_default(data.block_per_second, Range::POSITIVE),
        })
    }

    pub fn data(&self) -> &CapabilityData {
        self.data
    }

    pub fn supported_bitrate(&self) -> Option<Range> {
        self.data.bitrate
    }

    pub fn supported_formats(&self) -> &[i32] {
        &self.data.format
    }

    pub fn supported_profiles(&self) -> &[i32] {
        &self.data.profiles
    }

    pub fn supported_levels(&self) -> &[i32] {
        &self.data.levels
    }

    pub fn supported_bitrate_modes(&self) -> &[i32] {
        &self.data.bitrate_mode
    }

    pub fn supported_width(&self) -> Range {
        self.width
    }

    pub fn supported_height(&self) -> Range {
        self.height
    }

    pub fn supported_frame_rate(&self) -> Range {
        self.frame_rate
    }

    pub fn supported_quality(&self) -> Option<Range> {
        self.data.quality
    }

    pub fn supported_encode_quality(&self) -> Option<Range> {
        self.data.encode_quality
    }

    pub fn supported_complexity(&self) -> Option<Range> {
        self.data.complexity
    }

    /// Width alignment is the lower bound of the alignment range.
    pub fn width_alignment(&self) -> Option<i32> {
        self.data.alignment.map(|range| range.min)
    }

    /// Height alignment is the upper bound of the alignment range.
    pub fn height_alignment(&self) -> Option<i32> {
        self.data.alignment.map(|range| range.max)
    }

    pub fn is_size_supported(&self, width: i32, height: i32) -> bool {
        self.width.contains(width) && self.height.contains(height)
    }

    fn block_count(&self, width: i32, height: i32) -> i64 {
        i64::from(div_ceil(width, self.block.width))
            * i64::from(div_ceil(height, self.block.height))
    }

    /// Frame rates achievable at `width`x`height`, bounded by the block throughput.
    ///
    /// Returns `None` if the size itself is unsupported.
    pub fn supported_frame_rates_for(&self, width: i32, height: i32) -> Option<Range> {
        if !self.is_size_supported(width, height) {
            debug!(
                "\"{}\" does not support {}x{}",
                self.data.codec_name, width, height
            );
            return None;
        }
        let blocks = self.block_count(width, height).max(1);
        if !self.block_per_frame.contains(i32::try_from(blocks).unwrap_or(i32::MAX)) {
            return None;
        }
        let min =
            (i64::from(self.block_per_second.min) / blocks).max(i64::from(self.frame_rate.min));
        let max =
            (i64::from(self.block_per_second.max) / blocks).min(i64::from(self.frame_rate.max));
        if min > max {
            return None;
        }
        Range::new(min as i32, max as i32).ok()
    }

    pub fn is_size_and_rate_supported(&self, width: i32, height: i32, frame_rate: f64) -> bool {
        self.supported_frame_rates_for(width, height)
            .is_some_and(|range| range.contains_f64(frame_rate, 0.0))
    }

    /// Frame-rate range measured at the resolution closest (in block count)
    /// to `width`x`height`, scaled by the ratio of the two block counts.
    pub fn preferred_frame_rate(&self, width: i32, height: i32) -> Option<Range> {
        if !self.is_size_supported(width, height) || self.data.measured_frame_rate.is_empty() {
            return None;
        }
        let target = self.block_count(width, height);
        let (closest, measured) = self
            .data
            .measured_frame_rate
            .iter()
            .min_by_key(|(size, _)| (self.block_count(size.width, size.height) - target).abs())?;
        debug!(
            "\"{}\": closest measured size to {}x{} is {}",
            self.data.codec_name, width, height, closest
        );
        let factor = self.block_count(closest.width, closest.height) as f64 / target.max(1) as f64;
        Some(Range {
            min: (f64::from(measured.min) * factor) as i32,
            max: (f64::from(measured.max) * factor) as i32,
        })
    }
}

/// Audio codec view.
#[derive(Debug, Clone)]
pub struct AudioCaps<'a> {
    data: &'a CapabilityData,
}

impl<'a> AudioCaps<'a> {
    /// Wraps an audio record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] for video records.
    pub fn new(data: &'a CapabilityData) -> Result<Self> {
        if !data.codec_type.is_audio() {
            return Err(Error::IllegalArgument(format!(
                "\"{}\" is not an audio codec",
                data.codec_name
            )));
        }
        Ok(Self { data })
    }

    pub fn data(&self) -> &CapabilityData {
        self.data
    }

    pub fn supported_bitrate(&self) -> Option<Range> {
        self.data.bitrate
    }

    pub fn supported_channels(&self) -> Option<Range> {
        self.data.channels
    }

    pub fn supported_formats(&self) -> &[i32] {
        &self.data.format
    }

    pub fn supported_sample_rates(&self) -> &[i32] {
        &self.data.sample_rate
    }

    pub fn supported_profiles(&self) -> &[i32] {
        &self.data.profiles
    }

    pub fn supported_levels(&self) -> &[i32] {
        &self.data.levels
    }

    pub fn supported_complexity(&self) -> Option<Range> {
        self.data.complexity
    }

    pub fn is_sample_rate_supported(&self, sample_rate: i32) -> bool {
        self.data.sample_rate.is_empty() || self.data.sample_rate.contains(&sample_rate)
    }

    pub fn is_channel_count_supported(&self, channels: i32) -> bool {
        self.data
            .channels
            .is_none_or(|range| range.contains(channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecType;

    fn avc() -> CapabilityData {
        let mut data = CapabilityData::new(CodecType::VideoDecoder);
        data.codec_name = "avc".into();
        data.width = Some(Range { min: 16, max: 1920 });
        data.height = Some(Range { min: 16, max: 1088 });
        data.frame_rate = Some(Range { min: 1, max: 60 });
        data.block_size = Some(Size::new(16, 16));
        data.block_per_second = Some(Range { min: 1, max: 244_800 });
        data.measured_frame_rate.insert(Size::new(1920, 1080), Range { min: 1, max: 30 });
        data.measured_frame_rate.insert(Size::new(640, 480), Range { min: 1, max: 120 });
        data
    }

    #[test]
    fn frame_rates_follow_block_throughput() {
        let data = avc();
        let caps = VideoCaps::new(&data).unwrap();
        // 1920x1088 is 120x68 = 8160 blocks; 244800 / 8160 = 30.
        assert_eq!(caps.supported_frame_rates_for(1920, 1088), Some(Range { min: 1, max: 30 }));
        // 1280x720 is 80x45 = 3600 blocks; 244800 / 3600 = 68, capped by 60.
        assert_eq!(caps.supported_frame_rates_for(1280, 720), Some(Range { min: 1, max: 60 }));
        assert_eq!(caps.supported_frame_rates_for(3840, 2160), None);
        assert!(caps.is_size_and_rate_supported(1920, 1080, 29.97));
        assert!(!caps.is_size_and_rate_supported(1920, 1080, 59.94));
    }

    #[test]
    fn preferred_rate_scales_from_closest_measurement() {
        let data = avc();
        let caps = VideoCaps::new(&data).unwrap();
        assert_eq!(caps.preferred_frame_rate(1920, 1080), Some(Range { min: 1, max: 30 }));
        // 640x480 measured directly.
        assert_eq!(caps.preferred_frame_rate(640, 480), Some(Range { min: 1, max: 120 }));
        assert_eq!(caps.preferred_frame_rate(4096, 4096), None);
    }

    #[test]
    fn defaults_apply_to_missing_ranges() {
        let data = CapabilityData::new(CodecType::VideoEncoder);
        let caps = VideoCaps::new(&data).unwrap();
        assert_eq!(caps.supported_frame_rate(), Range { min: 1, max: 30 });
        assert!(caps.is_size_supported(1, i32::MAX));
        assert!(AudioCaps::new(&data).is_err());
    }
}
