// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed symbol tables used to resolve enumerated descriptor values.

/// A named table of symbol to integer constant mappings.
#[derive(Debug)]
pub struct SymbolTable {
    pub name: &'static str,
    entries: &'static [(&'static str, i32)],
}

impl SymbolTable {
    /// Looks up a symbol.
    pub fn get(&self, symbol: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|(name, _)| *name == symbol)
            .map(|(_, value)| *value)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    /// Reverse lookup, first symbol bound to `value`.
    pub fn symbol(&self, value: i32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| *name)
    }
}

pub const VIDEO_PROFILES: SymbolTable = SymbolTable {
    name: "video profile",
    entries: &[
        // H263
        ("H263BackwardCompatible", 0),
        ("H263Baseline", 1),
        ("H263H320Coding", 2),
        ("H263HighCompression", 3),
        ("H263HighLatency", 4),
        ("H263ISWV2", 5),
        ("H263ISWV3", 6),
        ("H263Interlace", 7),
        ("H263Internet", 8),
        // H264
        ("AVCBaseline", AVC_PROFILE_BASELINE),
        ("AVCHighCompression", 1),
        ("AVCConstrainedHigh", 2),
        ("AVCExtended", 3),
        ("AVCHigh", 4),
        ("AVCHigh10", 5),
        ("AVCHigh422", 6),
        ("AVCHigh444", 7),
        ("AVCMain", AVC_PROFILE_MAIN),
        // H265
        ("HEVCMain", 0),
        ("HEVCMain10", 1),
        ("HEVCMainStill", 3),
        // MPEG2
        ("MPEG2_422", 0),
        ("MPEG2High", 1),
        ("MPEG2Main", 2),
        ("MPEG2SNR", 3),
        ("MPEG2Simple", 4),
        ("MPEG2Spatial", 5),
        // MPEG4
        ("MPEG4AdvancedCoding", 0),
        ("MPEG4AdvancedCore", 1),
        ("MPEG4AdvancedRealTime", 2),
        ("MPEG4AdvancedScalable", 3),
        ("MPEG4AdvancedSimple", 4),
        ("MPEG4BasicAnimated", 5),
        ("MPEG4Core", 6),
        ("MPEG4CoreScalable", 7),
        ("MPEG4Hybrid", 8),
        ("MPEG4Main", 9),
        ("MPEG4Nbit", 10),
        ("MPEG4ScalableTexture", 11),
        ("MPEG4Simple", 12),
        ("MPEG4SimpleFBA", 13),
        ("MPEG4SimpleFace", 14),
        ("MPEG4SimpleScalable", 15),
        // VP8
        ("VP8Main", 0),
    ],
};

pub const AUDIO_PROFILES: SymbolTable = SymbolTable {
    name: "audio profile",
    entries: &[
        ("AAC_LC", 0),
        ("AAC_ELD", 1),
        ("AAC_ERLC", 2),
        ("AAC_HE", 3),
        ("AAC_HE_V2", 4),
        ("AAC_LD", 5),
        ("AAC_Main", 6),
    ],
};

pub const VIDEO_FORMATS: SymbolTable = SymbolTable {
    name: "video pixel format",
    entries: &[
        ("YUVI420", PIXEL_FORMAT_YUVI420),
        ("NV12", PIXEL_FORMAT_NV12),
        ("NV21", PIXEL_FORMAT_NV21),
    ],
};

pub const AUDIO_FORMATS: SymbolTable = SymbolTable {
    name: "audio sample format",
    entries: &[("U8", 0), ("S16LE", 1), ("S24LE", 2), ("S32LE", 3)],
};

pub const BITRATE_MODES: SymbolTable = SymbolTable {
    name: "bitrate mode",
    entries: &[("CBR", 0), ("VBR", 1), ("CQ", 2)],
};

pub const CODEC_TYPES: SymbolTable = SymbolTable {
    name: "codec type",
    entries: &[
        ("VIDEO_ENCODER", 0),
        ("VIDEO_DECODER", 1),
        ("AUDIO_ENCODER", 2),
        ("AUDIO_DECODER", 3),
    ],
};

/// Tables probed, in order, to decide how an integer-vector value is mapped.
pub const VECTOR_TABLES: [&SymbolTable; 5] = [
    &VIDEO_PROFILES,
    &AUDIO_PROFILES,
    &VIDEO_FORMATS,
    &AUDIO_FORMATS,
    &BITRATE_MODES,
];

pub const AVC_PROFILE_BASELINE: i32 = 0;
pub const AVC_PROFILE_MAIN: i32 = 8;

pub const PIXEL_FORMAT_YUVI420: i32 = 1;
pub const PIXEL_FORMAT_NV12: i32 = 2;
pub const PIXEL_FORMAT_NV21: i32 = 3;
