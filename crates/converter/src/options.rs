use serde::{Deserialize, Serialize};
use crate::error::{ConvertError, Result};

/// Label used by every selector for "leave this parameter as it is"
pub const SAME_AS_INPUT: &str = "Same as input";

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Mp4,
    Mkv,
    Avi,
    Mov,
    Wmv,
    Flv,
    Mpeg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Mp4,
        OutputFormat::Mkv,
        OutputFormat::Avi,
        OutputFormat::Mov,
        OutputFormat::Wmv,
        OutputFormat::Flv,
        OutputFormat::Mpeg,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "MP4",
            OutputFormat::Mkv => "MKV",
            OutputFormat::Avi => "AVI",
            OutputFormat::Mov => "MOV",
            OutputFormat::Wmv => "WMV",
            OutputFormat::Flv => "FLV",
            OutputFormat::Mpeg => "MPEG",
        }
    }

    /// File extension of the produced file (lowercased label)
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
            OutputFormat::Wmv => "wmv",
            OutputFormat::Flv => "flv",
            OutputFormat::Mpeg => "mpeg",
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        let wanted = label.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConvertError::UnknownFormat(label.to_string()))
    }
}

/// Video codec selectable by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Hevc,
    Mpeg4Part2,
    Mpeg2,
    ProResProxy,
    ProResLight,
    ProResStandard,
    ProResHq,
}

/// Ordered engine flags selecting and configuring one encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    pub codec: Codec,
    pub flags: &'static [&'static str],
}

impl Codec {
    pub const ALL: [Codec; 8] = [
        Codec::H264,
        Codec::Hevc,
        Codec::Mpeg4Part2,
        Codec::Mpeg2,
        Codec::ProResProxy,
        Codec::ProResLight,
        Codec::ProResStandard,
        Codec::ProResHq,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Codec::H264 => "H.264",
            Codec::Hevc => "HEVC (H.265)",
            Codec::Mpeg4Part2 => "MPEG-4 (Part 2)",
            Codec::Mpeg2 => "MPEG-2",
            Codec::ProResProxy => "ProRes Proxy",
            Codec::ProResLight => "ProRes Light",
            Codec::ProResStandard => "ProRes Standard",
            Codec::ProResHq => "ProRes HQ",
        }
    }

    /// Parse a codec label. Unrecognised labels are an error, never a fallback to H.264.
    pub fn from_label(label: &str) -> Result<Self> {
        let wanted = label.trim();
        if let Some(codec) = Self::ALL.into_iter().find(|c| c.label().eq_ignore_ascii_case(wanted)) {
            return Ok(codec);
        }
        match wanted.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Codec::H264),
            "hevc" | "h.265" | "h265" => Ok(Codec::Hevc),
            "mpeg-4 part 2" | "mpeg4" => Ok(Codec::Mpeg4Part2),
            "mpeg2" => Ok(Codec::Mpeg2),
            _ => Err(ConvertError::UnknownCodec(label.to_string())),
        }
    }

    pub fn profile(&self) -> CodecProfile {
        let flags: &'static [&'static str] = match self {
            Codec::H264 => &["-c:v", "libx264", "-preset", "medium"],
            Codec::Hevc => &["-c:v", "libx265", "-preset", "medium"],
            Codec::Mpeg4Part2 => &["-c:v", "mpeg4"],
            Codec::Mpeg2 => &["-c:v", "mpeg2video"],
            Codec::ProResProxy => &["-c:v", "prores_ks", "-profile:v", "0"],
            Codec::ProResLight => &["-c:v", "prores_ks", "-profile:v", "1"],
            Codec::ProResStandard => &["-c:v", "prores_ks", "-profile:v", "2"],
            Codec::ProResHq => &["-c:v", "prores_ks", "-profile:v", "3"],
        };
        CodecProfile { codec: *self, flags }
    }

    /// Codecs whose decode path can be offloaded to CUDA
    pub fn is_hw_accelerable(&self) -> bool {
        matches!(self, Codec::H264 | Codec::Hevc)
    }
}

/// Output frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Unchanged,
    Uhd2160,
    Qhd1440,
    Fhd1080,
    Hd720,
    Sd480,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Resolution::Unchanged,
        Resolution::Uhd2160,
        Resolution::Qhd1440,
        Resolution::Fhd1080,
        Resolution::Hd720,
        Resolution::Sd480,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Unchanged => SAME_AS_INPUT,
            Resolution::Uhd2160 => "3840x2160 (4K)",
            Resolution::Qhd1440 => "2560x1440 (1440p)",
            Resolution::Fhd1080 => "1920x1080 (1080p)",
            Resolution::Hd720 => "1280x720 (720p)",
            Resolution::Sd480 => "854x480 (480p)",
        }
    }

    fn short_label(&self) -> &'static str {
        match self {
            Resolution::Unchanged => "unchanged",
            Resolution::Uhd2160 => "4k",
            Resolution::Qhd1440 => "1440p",
            Resolution::Fhd1080 => "1080p",
            Resolution::Hd720 => "720p",
            Resolution::Sd480 => "480p",
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        let wanted = label.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(wanted) || r.short_label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConvertError::UnknownResolution(label.to_string()))
    }

    /// `width:height` for the scale filter, `None` when unchanged
    pub fn scale(&self) -> Option<&'static str> {
        match self {
            Resolution::Unchanged => None,
            Resolution::Uhd2160 => Some("3840:2160"),
            Resolution::Qhd1440 => Some("2560:1440"),
            Resolution::Fhd1080 => Some("1920:1080"),
            Resolution::Hd720 => Some("1280:720"),
            Resolution::Sd480 => Some("854:480"),
        }
    }
}

/// Output frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fps {
    Unchanged,
    Fps23_97,
    Fps24,
    Fps25,
    Fps29_97,
    Fps30,
    Fps60,
}

impl Fps {
    pub const ALL: [Fps; 7] = [
        Fps::Unchanged,
        Fps::Fps23_97,
        Fps::Fps24,
        Fps::Fps25,
        Fps::Fps29_97,
        Fps::Fps30,
        Fps::Fps60,
    ];

    pub fn label(&self) -> &'static str {
        self.value().unwrap_or(SAME_AS_INPUT)
    }

    /// Literal value passed to `-r`, `None` when unchanged
    pub fn value(&self) -> Option<&'static str> {
        match self {
            Fps::Unchanged => None,
            Fps::Fps23_97 => Some("23.97"),
            Fps::Fps24 => Some("24"),
            Fps::Fps25 => Some("25"),
            Fps::Fps29_97 => Some("29.97"),
            Fps::Fps30 => Some("30"),
            Fps::Fps60 => Some("60"),
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        let wanted = label.trim();
        if wanted.eq_ignore_ascii_case(SAME_AS_INPUT) || wanted.eq_ignore_ascii_case("unchanged") {
            return Ok(Fps::Unchanged);
        }
        Self::ALL
            .into_iter()
            .find(|f| f.value() == Some(wanted))
            .ok_or_else(|| ConvertError::UnknownFps(label.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitrateUnit {
    Kbps,
    Mbps,
}

impl BitrateUnit {
    pub const ALL: [BitrateUnit; 2] = [BitrateUnit::Kbps, BitrateUnit::Mbps];

    pub fn label(&self) -> &'static str {
        match self {
            BitrateUnit::Kbps => "kbps",
            BitrateUnit::Mbps => "Mbps",
        }
    }

    /// Multiplier suffix understood by the engine
    pub fn suffix(&self) -> &'static str {
        match self {
            BitrateUnit::Kbps => "k",
            BitrateUnit::Mbps => "M",
        }
    }

    /// Unit labels are matched exactly: "mbps" is not "Mbps"
    pub fn from_label(label: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|u| u.label() == label.trim())
            .ok_or_else(|| ConvertError::InvalidBitrateUnit(label.to_string()))
    }
}

/// Target video bitrate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bitrate {
    /// No explicit bitrate; quality-driven encoding
    Auto,
    Value { amount: f64, unit: BitrateUnit },
}

impl Bitrate {
    /// Parse free-form bitrate text plus a unit label.
    ///
    /// Blank text or "auto" (any case) yields [`Bitrate::Auto`] and the unit is ignored.
    /// The value is checked before the unit.
    pub fn parse(text: &str, unit_label: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("auto") {
            return Ok(Bitrate::Auto);
        }

        let amount: f64 = text
            .parse()
            .map_err(|_| ConvertError::InvalidBitrateValue(text.to_string()))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(ConvertError::InvalidBitrateValue(text.to_string()));
        }

        let unit = BitrateUnit::from_label(unit_label)?;
        Ok(Bitrate::Value { amount, unit })
    }

    /// Value for `-b:v`, e.g. `2.5M` or `800k`; `None` for auto
    pub fn engine_value(&self) -> Option<String> {
        match self {
            Bitrate::Auto => None,
            Bitrate::Value { amount, unit } => Some(format!("{}{}", amount, unit.suffix())),
        }
    }
}

/// User-facing selections exactly as the presentation layer provides them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub format: String,
    pub codec: String,
    pub resolution: String,
    pub bitrate: String,
    pub bitrate_unit: String,
    pub fps: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4.label().to_string(),
            codec: Codec::H264.label().to_string(),
            resolution: SAME_AS_INPUT.to_string(),
            bitrate: String::new(),
            bitrate_unit: BitrateUnit::Mbps.label().to_string(),
            fps: SAME_AS_INPUT.to_string(),
        }
    }
}

impl ConversionOptions {
    /// Resolve every label into its engine-ready form.
    ///
    /// Bitrate is resolved first so a bad value is reported even when other labels are fine.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let bitrate = Bitrate::parse(&self.bitrate, &self.bitrate_unit)?;
        Ok(ResolvedOptions {
            format: OutputFormat::from_label(&self.format)?,
            codec: Codec::from_label(&self.codec)?,
            resolution: Resolution::from_label(&self.resolution)?,
            bitrate,
            fps: Fps::from_label(&self.fps)?,
        })
    }
}

/// Options after label resolution; everything here is known to be valid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedOptions {
    pub format: OutputFormat,
    pub codec: Codec,
    pub resolution: Resolution,
    pub bitrate: Bitrate,
    pub fps: Fps,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_every_label_round_trips() {
        for format in OutputFormat::ALL {
            assert_eq!(OutputFormat::from_label(format.label()).unwrap(), format);
        }
        for codec in Codec::ALL {
            assert_eq!(Codec::from_label(codec.label()).unwrap(), codec);
        }
        for resolution in Resolution::ALL {
            assert_eq!(Resolution::from_label(resolution.label()).unwrap(), resolution);
        }
        for fps in Fps::ALL {
            assert_eq!(Fps::from_label(fps.label()).unwrap(), fps);
        }
    }

    #[test]
    fn test_unknown_codec_is_rejected() {
        let err = Codec::from_label("VP9").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownCodec(ref l) if l == "VP9"));
    }

    #[test]
    fn test_codec_profiles() {
        assert_eq!(Codec::H264.profile().flags, &["-c:v", "libx264", "-preset", "medium"]);
        assert_eq!(Codec::Hevc.profile().flags, &["-c:v", "libx265", "-preset", "medium"]);
        assert_eq!(Codec::Mpeg2.profile().flags, &["-c:v", "mpeg2video"]);
        assert_eq!(Codec::ProResHq.profile().flags, &["-c:v", "prores_ks", "-profile:v", "3"]);
        for codec in Codec::ALL {
            assert_eq!(codec.profile().codec, codec);
            assert_eq!(codec.profile().flags[0], "-c:v");
        }
    }

    #[test]
    fn test_hw_accelerable_subset() {
        let accelerable: Vec<_> = Codec::ALL.into_iter().filter(|c| c.is_hw_accelerable()).collect();
        assert_eq!(accelerable, vec![Codec::H264, Codec::Hevc]);
    }

    #[test]
    fn test_resolution_scale_table() {
        assert_eq!(Resolution::Unchanged.scale(), None);
        assert_eq!(Resolution::from_label("3840x2160 (4K)").unwrap().scale(), Some("3840:2160"));
        assert_eq!(Resolution::from_label("2560x1440 (1440p)").unwrap().scale(), Some("2560:1440"));
        assert_eq!(Resolution::from_label("1920x1080 (1080p)").unwrap().scale(), Some("1920:1080"));
        assert_eq!(Resolution::from_label("1280x720 (720p)").unwrap().scale(), Some("1280:720"));
        assert_eq!(Resolution::from_label("854x480 (480p)").unwrap().scale(), Some("854:480"));
        assert_eq!(Resolution::from_label("4K").unwrap(), Resolution::Uhd2160);
        assert!(matches!(
            Resolution::from_label("640x360"),
            Err(ConvertError::UnknownResolution(_))
        ));
    }

    #[test]
    fn test_fps_passes_literal_value() {
        assert_eq!(Fps::from_label("29.97").unwrap().value(), Some("29.97"));
        assert_eq!(Fps::from_label("Same as input").unwrap(), Fps::Unchanged);
        assert!(matches!(Fps::from_label("48"), Err(ConvertError::UnknownFps(_))));
    }

    #[test]
    fn test_bitrate_auto_and_blank() {
        assert_eq!(Bitrate::parse("", "Mbps").unwrap(), Bitrate::Auto);
        assert_eq!(Bitrate::parse("  ", "Mbps").unwrap(), Bitrate::Auto);
        assert_eq!(Bitrate::parse("AUTO", "whatever").unwrap(), Bitrate::Auto);
        assert_eq!(Bitrate::Auto.engine_value(), None);
    }

    #[test]
    fn test_bitrate_suffixes() {
        assert_eq!(Bitrate::parse("2.5", "Mbps").unwrap().engine_value().as_deref(), Some("2.5M"));
        assert_eq!(Bitrate::parse("800", "kbps").unwrap().engine_value().as_deref(), Some("800k"));
    }

    #[test]
    fn test_bitrate_errors() {
        assert!(matches!(Bitrate::parse("abc", "Mbps"), Err(ConvertError::InvalidBitrateValue(_))));
        assert!(matches!(Bitrate::parse("-5", "Mbps"), Err(ConvertError::InvalidBitrateValue(_))));
        assert!(matches!(Bitrate::parse("inf", "Mbps"), Err(ConvertError::InvalidBitrateValue(_))));
        assert!(matches!(Bitrate::parse("5", "Gbps"), Err(ConvertError::InvalidBitrateUnit(_))));
        // value is validated before the unit
        assert!(matches!(Bitrate::parse("abc", "Gbps"), Err(ConvertError::InvalidBitrateValue(_))));
    }

    #[test]
    fn test_default_options_resolve() {
        let resolved = ConversionOptions::default().resolve().unwrap();
        assert_eq!(resolved.format, OutputFormat::Mp4);
        assert_eq!(resolved.codec, Codec::H264);
        assert_eq!(resolved.resolution, Resolution::Unchanged);
        assert_eq!(resolved.bitrate, Bitrate::Auto);
        assert_eq!(resolved.fps, Fps::Unchanged);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_numeric_bitrate_always_resolves(
            amount in 0.0f64..100_000.0,
            mbps in prop::bool::ANY,
        ) {
            let unit = if mbps { "Mbps" } else { "kbps" };
            let bitrate = Bitrate::parse(&amount.to_string(), unit).unwrap();
            let value = bitrate.engine_value().unwrap();
            let suffix = if mbps { 'M' } else { 'k' };
            prop_assert!(value.ends_with(suffix));
            let number: f64 = value[..value.len() - 1].parse().unwrap();
            prop_assert!((number - amount).abs() < 1e-9);
        }

        #[test]
        fn test_non_numeric_bitrate_is_rejected(text in "[a-zA-Z]{1,8}") {
            prop_assume!(!text.eq_ignore_ascii_case("auto"));
            let is_invalid_value = matches!(
                Bitrate::parse(&text, "Mbps"),
                Err(ConvertError::InvalidBitrateValue(_))
            );
            prop_assert!(is_invalid_value);
        }
    }
}
