/// The identity of a gPTP time-aware system.
///
/// All systems in a gPTP network need a unique clock identity. The usual
/// approach is to derive it from the mac address of the device (see
/// [`from_mac_address`](`Self::from_mac_address`)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    /// Create a [`ClockIdentity`] from a mac address.
    ///
    /// The EUI-48 is extended to an EUI-64 by inserting `FF:FE` between the
    /// organizationally unique identifier and the device specific part.
    ///
    /// # Example
    /// ```
    /// # use gptp::config::ClockIdentity;
    /// let id = ClockIdentity::from_mac_address([0xA, 0xB, 0xC, 0xD, 0xE, 0xF]);
    /// assert_eq!(id.0, [0xA, 0xB, 0xC, 0xFF, 0xFE, 0xD, 0xE, 0xF]);
    /// ```
    pub fn from_mac_address(addr: [u8; 6]) -> Self {
        let mut this = Self([0xFF; 8]);

        this.0[0..3].copy_from_slice(&addr[0..3]);
        this.0[4] = 0xFE;
        this.0[5..8].copy_from_slice(&addr[3..6]);

        this
    }

    /// Interpret a big endian 64 bit number as clock identity
    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    /// The clock identity as big endian 64 bit number
    pub const fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl core::fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, val) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ":")?;
            }

            write!(f, "{:02x}", val)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn u64_conversion() {
        let id = ClockIdentity::from_u64(0x0001_02ff_fe03_0405);
        assert_eq!(id.0, [0x00, 0x01, 0x02, 0xff, 0xfe, 0x03, 0x04, 0x05]);
        assert_eq!(id.as_u64(), 0x0001_02ff_fe03_0405);
    }

    #[test]
    fn display() {
        let id = ClockIdentity([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(id.to_string(), "01:02:03:04:05:06:07:08");
    }
}
