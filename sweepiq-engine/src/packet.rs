//! Decoded receiver packets as handed over by the transport.
//!
//! The wire decoder is not part of this crate: whatever parses the device's
//! framing produces [`Packet`] values. Sizes are kept in 32-bit words, the
//! unit the framing counts in.

use num_complex::Complex;

/// Metadata carried by context packets. Each field is optional on the wire;
/// merging keeps the most recently received value per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub sweep_id: Option<u32>,
    /// Reference level in dBm.
    pub reflevel: Option<f64>,
    /// RF centre frequency of the capture in Hz.
    pub rffreq: Option<f64>,
    pub spectral_inversion: Option<bool>,
}

impl Context {
    /// Merge `update` into `self`; fields present in `update` win.
    pub fn merge(&mut self, update: &Context) {
        if update.sweep_id.is_some() {
            self.sweep_id = update.sweep_id;
        }
        if update.reflevel.is_some() {
            self.reflevel = update.reflevel;
        }
        if update.rffreq.is_some() {
            self.rffreq = update.rffreq;
        }
        if update.spectral_inversion.is_some() {
            self.spectral_inversion = update.spectral_inversion;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextPacket {
    pub words: u32,
    pub fields: Context,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    pub words: u32,
    pub samples: Vec<Complex<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Context(ContextPacket),
    Data(DataPacket),
}

impl Packet {
    /// Words of framing around a packet's payload.
    pub const HEADER_WORDS: u32 = 7;

    pub fn context(fields: Context) -> Self {
        Packet::Context(ContextPacket {
            words: Self::HEADER_WORDS + 4,
            fields,
        })
    }

    /// A data packet carrying one 32-bit I/Q word per sample.
    pub fn data(samples: Vec<Complex<f32>>) -> Self {
        let words = Self::HEADER_WORDS + samples.len() as u32;
        Packet::Data(DataPacket { words, samples })
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Packet::Context(_))
    }

    pub fn byte_len(&self) -> u64 {
        let words = match self {
            Packet::Context(p) => p.words,
            Packet::Data(p) => p.words,
        };
        u64::from(words) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_last_writer_wins() {
        let mut context = Context {
            sweep_id: Some(1),
            reflevel: Some(-10.0),
            ..Context::default()
        };
        context.merge(&Context {
            sweep_id: Some(2),
            rffreq: Some(2.4e9),
            ..Context::default()
        });

        assert_eq!(context.sweep_id, Some(2));
        assert_eq!(context.reflevel, Some(-10.0));
        assert_eq!(context.rffreq, Some(2.4e9));
        assert_eq!(context.spectral_inversion, None);
    }

    #[test]
    fn test_byte_len_counts_words() {
        let packet = Packet::data(vec![Complex::new(0.0, 0.0); 1024]);
        assert_eq!(packet.byte_len(), (1024 + 7) * 4);
        assert!(!packet.is_context());
        assert_eq!(Packet::context(Context::default()).byte_len(), 44);
    }
}
