/// A description of the accuracy and type of a clock.
///
/// Values are kept in their raw encoding. Lower values always describe a
/// better clock, which is what the best master clock algorithm relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockQuality {
    /// The traceability of the clock (`clockClass`)
    pub clock_class: u8,
    /// The accuracy of the clock (`clockAccuracy`)
    pub clock_accuracy: u8,
    /// 2-log of the variance (in seconds^2) of the clock when not synchronized
    /// (`offsetScaledLogVariance`)
    pub offset_scaled_log_variance: u16,
}

impl Default for ClockQuality {
    fn default() -> Self {
        Self {
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0x4100,
        }
    }
}
