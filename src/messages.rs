/*! Typed messages of the client/server protocol.

The opcode space is split into commands (client → server), info
messages (server → client) and the shared heartbeat. Small commands
live entirely in the header spares (`b1`, `b2`, `s1`, `s2`); everything
else carries a fixed-size body whose length is a function of the
opcode, except the spectrum message whose length rides in `s1`.

Field order inside each body is the wire contract; both ends of the
link iterate the same order.
*/
use crate::codec::{WireReader, WireWriter};
use crate::frame::Header;

/// Protocol version, sent inside the authentication challenge.
pub const CLIENT_SERVER_VERSION: u32 = 0x0100_0002;

/// Maximum width of a panadapter, in spectrum samples.
pub const SPECTRUM_DATA_SIZE: usize = 4096;

/// Audio block size: this many stereo samples per INFO_RXAUDIO.
pub const AUDIO_DATA_SIZE: usize = 1024;

/// Payloads above this size are a programming error, not traffic.
pub const MAX_PAYLOAD: usize = 32000;

/// Number of equalizer bands carried per equalizer message.
pub const EQ_BANDS: usize = 11;

macro_rules! message_types {
    ($($name:ident),* $(,)?) => {
        /// Every message type on the client/server link.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u16)]
        #[allow(missing_docs)]
        pub enum MessageType {
            $($name,)*
        }

        impl MessageType {
            const ALL: &'static [MessageType] = &[$(MessageType::$name,)*];

            /// Look up a wire value.
            #[must_use]
            pub fn from_u16(v: u16) -> Option<MessageType> {
                Self::ALL.get(v as usize).copied()
            }
        }
    };
}

message_types![
    CmdAdc,
    CmdAgc,
    CmdAgcGain,
    CmdAmCarrier,
    CmdAnan10E,
    CmdAttenuation,
    CmdBandSel,
    CmdBandstack,
    CmdBinaural,
    CmdCompressor,
    CmdCtcss,
    CmdCtun,
    CmdCw,
    CmdCwPeak,
    CmdDeviation,
    CmdDexp,
    CmdDigiMax,
    CmdDiversity,
    CmdDrive,
    CmdDup,
    CmdFilterBoard,
    CmdFilterCut,
    CmdFilterSel,
    CmdFilterVar,
    CmdFps,
    CmdFreq,
    CmdHeartbeat,
    CmdLock,
    CmdMeter,
    CmdMicGain,
    CmdMode,
    CmdMove,
    CmdMoveTo,
    CmdMox,
    CmdMuteRx,
    CmdNoise,
    CmdPan,
    CmdPaTrim,
    CmdPreemp,
    CmdPsAtt,
    CmdPsOnOff,
    CmdPsParams,
    CmdPsReset,
    CmdPsResume,
    CmdPtt,
    CmdRadioMenu,
    CmdRecall,
    CmdReceivers,
    CmdRegion,
    CmdRfGain,
    CmdRit,
    CmdRitStep,
    CmdRxFft,
    CmdRxMenu,
    CmdRxDisplay,
    CmdRxEq,
    CmdRxSelect,
    CmdSampleRate,
    CmdSat,
    CmdScreen,
    CmdSidetoneFreq,
    CmdSoapyAgc,
    CmdSoapyRxAnt,
    CmdSoapyTxAnt,
    CmdSpectrum,
    CmdSplit,
    CmdSquelch,
    CmdStartRadio,
    CmdStep,
    CmdStore,
    CmdTune,
    CmdTwoTone,
    CmdTxFft,
    CmdTxFilter,
    CmdTxMenu,
    CmdTxDisplay,
    CmdTxEq,
    CmdVfoAtoB,
    CmdVfoBtoA,
    CmdVfoStepSize,
    CmdVfoSwap,
    CmdVolume,
    CmdVox,
    CmdXit,
    CmdXvtr,
    CmdZoom,
    InfoAdc,
    InfoBand,
    InfoBandstack,
    InfoDac,
    InfoDisplay,
    InfoMemory,
    InfoPs,
    InfoRadio,
    InfoReceiver,
    InfoRxAudio,
    InfoSpectrum,
    InfoTransmitter,
    InfoTxAudio,
    InfoVfo,
];

/// Body length class of a message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyLen {
    /// Header-only; the spares are the payload.
    None,
    /// Fixed number of body bytes after the header.
    Fixed(usize),
    /// Length carried in `header.s1`.
    Variable,
}

impl MessageType {
    /// How many body bytes follow the header for this type.
    #[must_use]
    pub fn body_len(self) -> BodyLen {
        use BodyLen::*;
        use MessageType::*;
        match self {
            // One u64 (or i64) after the header.
            CmdFreq | CmdMove | CmdMoveTo | CmdVfoStepSize | CmdRit | CmdXit | CmdSampleRate
            | CmdRxFft | CmdTxFft => Fixed(8),
            // One double after the header.
            CmdDrive | CmdMicGain | CmdVolume | CmdSquelch | CmdRfGain | CmdAmCarrier
            | CmdDigiMax => Fixed(8),
            CmdAgcGain => Fixed(AgcGainCommand::BODY_LEN),
            CmdCompressor => Fixed(CompressorData::BODY_LEN),
            CmdDexp => Fixed(DexpData::BODY_LEN),
            CmdDiversity => Fixed(DiversityCommand::BODY_LEN),
            CmdNoise => Fixed(NoiseCommand::BODY_LEN),
            CmdPaTrim => Fixed(PaTrimData::BODY_LEN),
            CmdPsParams => Fixed(PsParams::BODY_LEN),
            CmdRadioMenu => Fixed(RadioMenuData::BODY_LEN),
            CmdRxMenu => Fixed(RxMenuData::BODY_LEN),
            CmdTxMenu => Fixed(TxMenuData::BODY_LEN),
            CmdRxEq | CmdTxEq => Fixed(EqualizerCommand::BODY_LEN),
            InfoAdc => Fixed(AdcData::BODY_LEN),
            InfoBand => Fixed(BandData::BODY_LEN),
            InfoBandstack => Fixed(BandstackData::BODY_LEN),
            InfoDac => Fixed(DacData::BODY_LEN),
            InfoDisplay => Fixed(DisplayData::BODY_LEN),
            InfoMemory => Fixed(MemoryData::BODY_LEN),
            InfoPs => Fixed(PsData::BODY_LEN),
            InfoRadio => Fixed(RadioData::BODY_LEN),
            InfoReceiver => Fixed(ReceiverData::BODY_LEN),
            InfoRxAudio => Fixed(RxAudioData::BODY_LEN),
            InfoTransmitter => Fixed(TransmitterData::BODY_LEN),
            InfoTxAudio => Fixed(TxAudioData::BODY_LEN),
            InfoVfo => Fixed(VfoData::BODY_LEN),
            InfoSpectrum => Variable,
            _ => None,
        }
    }
}

fn assemble(mut header: Header, kind: MessageType, body: &[u8]) -> Vec<u8> {
    header.kind = kind as u16;
    let mut out = Vec::with_capacity(crate::frame::HEADER_SIZE + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(body);
    out
}

/// Header-only message with the given spares.
#[must_use]
pub fn header_only(kind: MessageType, b1: u8, b2: u8, s1: u16, s2: u16) -> Vec<u8> {
    assemble(Header { kind: 0, b1, b2, s1, s2 }, kind, &[])
}

/// Message carrying one u64 (frequencies, step sizes, sample rates).
#[must_use]
pub fn u64_command(kind: MessageType, b1: u8, b2: u8, value: i64) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(8);
    w.i64(value);
    assemble(
        Header { kind: 0, b1, b2, s1: 0, s2: 0 },
        kind,
        &w.into_bytes(),
    )
}

/// Message carrying one double (drive, gains, squelch).
#[must_use]
pub fn double_command(kind: MessageType, b1: u8, b2: u8, value: f64) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(8);
    w.double(value);
    assemble(
        Header { kind: 0, b1, b2, s1: 0, s2: 0 },
        kind,
        &w.into_bytes(),
    )
}

/// Global radio data, sent once when the session starts.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct RadioData {
    pub name: String,
    pub locked: bool,
    pub protocol: u8,
    pub supported_receivers: u8,
    pub receivers: u8,
    pub n_adc: u8,
    pub region: u8,
    pub tx_out_of_band_allowed: bool,
    pub pa_enabled: bool,
    pub mic_boost: bool,
    pub mic_linein: bool,
    pub mic_ptt_enabled: bool,
    pub mic_bias_enabled: bool,
    pub cw_keyer_sidetone_volume: u8,
    pub mute_rx_while_transmitting: bool,
    pub mute_spkr_amp: bool,
    pub split: bool,
    pub sat_mode: u8,
    pub duplex: bool,
    pub diversity_enabled: bool,
    pub have_rx_gain: bool,
    pub have_rx_att: bool,
    pub have_alex_att: bool,
    pub have_preamp: bool,
    pub have_dither: bool,
    pub soapy_rx_antennas: u8,
    pub soapy_tx_antennas: u8,
    pub soapy_rx_gains: u8,
    pub soapy_tx_gains: u8,
    pub pa_power: u16,
    pub cw_keyer_sidetone_frequency: u16,
    pub device: u16,
    pub tx_filter_low: i32,
    pub tx_filter_high: i32,
    pub display_width: u16,
    pub drive_max: f64,
    pub drive_digi_max: f64,
    pub div_gain: f64,
    pub div_phase: f64,
    pub frequency_calibration: i64,
    pub soapy_radio_sample_rate: i64,
    pub radio_frequency_min: i64,
    pub radio_frequency_max: i64,
    pub soapy_rx_antenna: [String; 8],
    pub soapy_tx_antenna: [String; 8],
    pub soapy_rx_gain: [String; 8],
    pub soapy_tx_gain: [String; 8],
}

impl RadioData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 32 + 28 + 12 + 32 + 32 + 4 * 8 * 32;

    /// Serialize as a complete INFO_RADIO message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.str(&self.name, 32);
        w.flag(self.locked);
        w.u8(self.protocol);
        w.u8(self.supported_receivers);
        w.u8(self.receivers);
        w.u8(self.n_adc);
        w.u8(self.region);
        w.flag(self.tx_out_of_band_allowed);
        w.flag(self.pa_enabled);
        w.flag(self.mic_boost);
        w.flag(self.mic_linein);
        w.flag(self.mic_ptt_enabled);
        w.flag(self.mic_bias_enabled);
        w.u8(self.cw_keyer_sidetone_volume);
        w.flag(self.mute_rx_while_transmitting);
        w.flag(self.mute_spkr_amp);
        w.flag(self.split);
        w.u8(self.sat_mode);
        w.flag(self.duplex);
        w.flag(self.diversity_enabled);
        w.flag(self.have_rx_gain);
        w.flag(self.have_rx_att);
        w.flag(self.have_alex_att);
        w.flag(self.have_preamp);
        w.flag(self.have_dither);
        w.u8(self.soapy_rx_antennas);
        w.u8(self.soapy_tx_antennas);
        w.u8(self.soapy_rx_gains);
        w.u8(self.soapy_tx_gains);
        w.u16(self.pa_power);
        w.u16(self.cw_keyer_sidetone_frequency);
        w.u16(self.device);
        w.short(self.tx_filter_low);
        w.short(self.tx_filter_high);
        w.u16(self.display_width);
        w.double(self.drive_max);
        w.double(self.drive_digi_max);
        w.double(self.div_gain);
        w.double(self.div_phase);
        w.i64(self.frequency_calibration);
        w.i64(self.soapy_radio_sample_rate);
        w.i64(self.radio_frequency_min);
        w.i64(self.radio_frequency_max);
        for s in &self.soapy_rx_antenna {
            w.str(s, 32);
        }
        for s in &self.soapy_tx_antenna {
            w.str(s, 32);
        }
        for s in &self.soapy_rx_gain {
            w.str(s, 32);
        }
        for s in &self.soapy_tx_gain {
            w.str(s, 32);
        }
        assemble(Header::default(), MessageType::InfoRadio, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            name: r.str(32),
            locked: r.flag(),
            protocol: r.u8(),
            supported_receivers: r.u8(),
            receivers: r.u8(),
            n_adc: r.u8(),
            region: r.u8(),
            tx_out_of_band_allowed: r.flag(),
            pa_enabled: r.flag(),
            mic_boost: r.flag(),
            mic_linein: r.flag(),
            mic_ptt_enabled: r.flag(),
            mic_bias_enabled: r.flag(),
            cw_keyer_sidetone_volume: r.u8(),
            mute_rx_while_transmitting: r.flag(),
            mute_spkr_amp: r.flag(),
            split: r.flag(),
            sat_mode: r.u8(),
            duplex: r.flag(),
            diversity_enabled: r.flag(),
            have_rx_gain: r.flag(),
            have_rx_att: r.flag(),
            have_alex_att: r.flag(),
            have_preamp: r.flag(),
            have_dither: r.flag(),
            soapy_rx_antennas: r.u8(),
            soapy_tx_antennas: r.u8(),
            soapy_rx_gains: r.u8(),
            soapy_tx_gains: r.u8(),
            pa_power: r.u16(),
            cw_keyer_sidetone_frequency: r.u16(),
            device: r.u16(),
            tx_filter_low: r.short(),
            tx_filter_high: r.short(),
            display_width: r.u16(),
            drive_max: r.double(),
            drive_digi_max: r.double(),
            div_gain: r.double(),
            div_phase: r.double(),
            frequency_calibration: r.i64(),
            soapy_radio_sample_rate: r.i64(),
            radio_frequency_min: r.i64(),
            radio_frequency_max: r.i64(),
            ..Self::default()
        };
        for s in d.soapy_rx_antenna.iter_mut() {
            *s = r.str(32);
        }
        for s in d.soapy_tx_antenna.iter_mut() {
            *s = r.str(32);
        }
        for s in d.soapy_rx_gain.iter_mut() {
            *s = r.str(32);
        }
        for s in d.soapy_tx_gain.iter_mut() {
            *s = r.str(32);
        }
        d
    }
}

/// Per-ADC data.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct AdcData {
    pub adc: u8,
    pub antenna: i32,
    pub attenuation: i32,
    pub gain: f64,
    pub min_gain: f64,
    pub max_gain: f64,
}

impl AdcData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 1 + 2 + 2 + 3 * 8;

    /// Serialize as a complete INFO_ADC message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.adc);
        w.short(self.antenna);
        w.short(self.attenuation);
        w.double(self.gain);
        w.double(self.min_gain);
        w.double(self.max_gain);
        assemble(Header::default(), MessageType::InfoAdc, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            adc: r.u8(),
            antenna: r.short(),
            attenuation: r.short(),
            gain: r.double(),
            min_gain: r.double(),
            max_gain: r.double(),
        }
    }
}

/// DAC data: TX antenna and gain.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct DacData {
    pub antenna: u8,
    pub gain: f64,
}

impl DacData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 1 + 8;

    /// Serialize as a complete INFO_DAC message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.antenna);
        w.double(self.gain);
        assemble(Header::default(), MessageType::InfoDac, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            antenna: r.u8(),
            gain: r.double(),
        }
    }
}

/// Everything the client needs to mirror one receiver.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ReceiverData {
    pub id: u8,
    pub adc: u8,
    pub agc: u8,
    pub nb: u8,
    pub nb2_mode: u8,
    pub nr: u8,
    pub nr_agc: u8,
    pub nr2_ae: u8,
    pub nr2_gain_method: u8,
    pub nr2_npe_method: u8,
    pub anf: u8,
    pub snb: u8,
    pub display_detector_mode: u8,
    pub display_average_mode: u8,
    pub zoom: u8,
    pub dither: bool,
    pub random: bool,
    pub preamp: bool,
    pub alex_antenna: u8,
    pub alex_attenuation: u8,
    pub squelch_enable: bool,
    pub binaural: bool,
    pub eq_enable: bool,
    pub smetermode: u8,
    pub low_latency: bool,
    pub fps: u16,
    pub filter_low: i32,
    pub filter_high: i32,
    pub deviation: u16,
    pub pan: u16,
    pub width: u16,
    pub hz_per_pixel: f64,
    pub squelch: f64,
    pub display_average_time: f64,
    pub volume: f64,
    pub agc_gain: f64,
    pub agc_hang: f64,
    pub agc_thresh: f64,
    pub agc_hang_threshold: f64,
    pub nb_tau: f64,
    pub nb_hang: f64,
    pub nb_advtime: f64,
    pub nb_thresh: f64,
    pub nr2_trained_threshold: f64,
    pub nr2_trained_t2: f64,
    pub nr4_reduction_amount: f64,
    pub nr4_smoothing_factor: f64,
    pub nr4_whitening_factor: f64,
    pub nr4_noise_rescale: f64,
    pub nr4_post_threshold: f64,
    pub eq_freq: [f64; EQ_BANDS],
    pub eq_gain: [f64; EQ_BANDS],
    pub fft_size: u64,
    pub sample_rate: u64,
}

impl ReceiverData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 25 + 12 + (19 + 2 * EQ_BANDS) * 8 + 16;

    /// Serialize as a complete INFO_RECEIVER message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.u8(self.adc);
        w.u8(self.agc);
        w.u8(self.nb);
        w.u8(self.nb2_mode);
        w.u8(self.nr);
        w.u8(self.nr_agc);
        w.u8(self.nr2_ae);
        w.u8(self.nr2_gain_method);
        w.u8(self.nr2_npe_method);
        w.u8(self.anf);
        w.u8(self.snb);
        w.u8(self.display_detector_mode);
        w.u8(self.display_average_mode);
        w.u8(self.zoom);
        w.flag(self.dither);
        w.flag(self.random);
        w.flag(self.preamp);
        w.u8(self.alex_antenna);
        w.u8(self.alex_attenuation);
        w.flag(self.squelch_enable);
        w.flag(self.binaural);
        w.flag(self.eq_enable);
        w.u8(self.smetermode);
        w.flag(self.low_latency);
        w.u16(self.fps);
        w.short(self.filter_low);
        w.short(self.filter_high);
        w.u16(self.deviation);
        w.u16(self.pan);
        w.u16(self.width);
        w.double(self.hz_per_pixel);
        w.double(self.squelch);
        w.double(self.display_average_time);
        w.double(self.volume);
        w.double(self.agc_gain);
        w.double(self.agc_hang);
        w.double(self.agc_thresh);
        w.double(self.agc_hang_threshold);
        w.double(self.nb_tau);
        w.double(self.nb_hang);
        w.double(self.nb_advtime);
        w.double(self.nb_thresh);
        w.double(self.nr2_trained_threshold);
        w.double(self.nr2_trained_t2);
        w.double(self.nr4_reduction_amount);
        w.double(self.nr4_smoothing_factor);
        w.double(self.nr4_whitening_factor);
        w.double(self.nr4_noise_rescale);
        w.double(self.nr4_post_threshold);
        for v in &self.eq_freq {
            w.double(*v);
        }
        for v in &self.eq_gain {
            w.double(*v);
        }
        w.u64(self.fft_size);
        w.u64(self.sample_rate);
        assemble(Header::default(), MessageType::InfoReceiver, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            id: r.u8(),
            adc: r.u8(),
            agc: r.u8(),
            nb: r.u8(),
            nb2_mode: r.u8(),
            nr: r.u8(),
            nr_agc: r.u8(),
            nr2_ae: r.u8(),
            nr2_gain_method: r.u8(),
            nr2_npe_method: r.u8(),
            anf: r.u8(),
            snb: r.u8(),
            display_detector_mode: r.u8(),
            display_average_mode: r.u8(),
            zoom: r.u8(),
            dither: r.flag(),
            random: r.flag(),
            preamp: r.flag(),
            alex_antenna: r.u8(),
            alex_attenuation: r.u8(),
            squelch_enable: r.flag(),
            binaural: r.flag(),
            eq_enable: r.flag(),
            smetermode: r.u8(),
            low_latency: r.flag(),
            fps: r.u16(),
            filter_low: r.short(),
            filter_high: r.short(),
            deviation: r.u16(),
            pan: r.u16(),
            width: r.u16(),
            hz_per_pixel: r.double(),
            squelch: r.double(),
            display_average_time: r.double(),
            volume: r.double(),
            agc_gain: r.double(),
            agc_hang: r.double(),
            agc_thresh: r.double(),
            agc_hang_threshold: r.double(),
            nb_tau: r.double(),
            nb_hang: r.double(),
            nb_advtime: r.double(),
            nb_thresh: r.double(),
            nr2_trained_threshold: r.double(),
            nr2_trained_t2: r.double(),
            nr4_reduction_amount: r.double(),
            nr4_smoothing_factor: r.double(),
            nr4_whitening_factor: r.double(),
            nr4_noise_rescale: r.double(),
            nr4_post_threshold: r.double(),
            ..Self::default()
        };
        for v in d.eq_freq.iter_mut() {
            *v = r.double();
        }
        for v in d.eq_gain.iter_mut() {
            *v = r.double();
        }
        d.fft_size = r.u64();
        d.sample_rate = r.u64();
        d
    }
}

/// Everything the client needs to mirror the transmitter.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct TransmitterData {
    pub id: u8,
    pub dac: u8,
    pub display_detector_mode: u8,
    pub display_average_mode: u8,
    pub use_rx_filter: bool,
    pub alex_antenna: u8,
    pub puresignal: bool,
    pub feedback: bool,
    pub auto_on: bool,
    pub ps_oneshot: bool,
    pub ctcss_enabled: bool,
    pub ctcss: u8,
    pub pre_emphasize: bool,
    pub drive: u8,
    pub tune_use_drive: bool,
    pub tune_drive: u8,
    pub compressor: bool,
    pub cfc: bool,
    pub cfc_eq: bool,
    pub dexp: bool,
    pub dexp_filter: bool,
    pub eq_enable: bool,
    pub alcmode: u8,
    pub fps: u16,
    pub dexp_filter_low: u16,
    pub dexp_filter_high: u16,
    pub dexp_trigger: u16,
    pub dexp_exp: u16,
    pub filter_low: i32,
    pub filter_high: i32,
    pub deviation: u16,
    pub width: u16,
    pub height: u16,
    pub attenuation: u16,
    pub fft_size: u64,
    pub eq_freq: [f64; EQ_BANDS],
    pub eq_gain: [f64; EQ_BANDS],
    pub dexp_tau: f64,
    pub dexp_attack: f64,
    pub dexp_release: f64,
    pub dexp_hold: f64,
    pub dexp_hyst: f64,
    pub cfc_freq: [f64; EQ_BANDS],
    pub cfc_lvl: [f64; EQ_BANDS],
    pub cfc_post: [f64; EQ_BANDS],
    pub mic_gain: f64,
    pub compressor_level: f64,
    pub display_average_time: f64,
    pub am_carrier_level: f64,
    pub ps_ampdelay: f64,
    pub ps_moxdelay: f64,
    pub ps_loopdelay: f64,
}

impl TransmitterData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 23 + 22 + 8 + (5 * EQ_BANDS + 12) * 8;

    /// Serialize as a complete INFO_TRANSMITTER message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.u8(self.dac);
        w.u8(self.display_detector_mode);
        w.u8(self.display_average_mode);
        w.flag(self.use_rx_filter);
        w.u8(self.alex_antenna);
        w.flag(self.puresignal);
        w.flag(self.feedback);
        w.flag(self.auto_on);
        w.flag(self.ps_oneshot);
        w.flag(self.ctcss_enabled);
        w.u8(self.ctcss);
        w.flag(self.pre_emphasize);
        w.u8(self.drive);
        w.flag(self.tune_use_drive);
        w.u8(self.tune_drive);
        w.flag(self.compressor);
        w.flag(self.cfc);
        w.flag(self.cfc_eq);
        w.flag(self.dexp);
        w.flag(self.dexp_filter);
        w.flag(self.eq_enable);
        w.u8(self.alcmode);
        w.u16(self.fps);
        w.u16(self.dexp_filter_low);
        w.u16(self.dexp_filter_high);
        w.u16(self.dexp_trigger);
        w.u16(self.dexp_exp);
        w.short(self.filter_low);
        w.short(self.filter_high);
        w.u16(self.deviation);
        w.u16(self.width);
        w.u16(self.height);
        w.u16(self.attenuation);
        w.u64(self.fft_size);
        for v in &self.eq_freq {
            w.double(*v);
        }
        for v in &self.eq_gain {
            w.double(*v);
        }
        w.double(self.dexp_tau);
        w.double(self.dexp_attack);
        w.double(self.dexp_release);
        w.double(self.dexp_hold);
        w.double(self.dexp_hyst);
        for v in &self.cfc_freq {
            w.double(*v);
        }
        for v in &self.cfc_lvl {
            w.double(*v);
        }
        for v in &self.cfc_post {
            w.double(*v);
        }
        w.double(self.mic_gain);
        w.double(self.compressor_level);
        w.double(self.display_average_time);
        w.double(self.am_carrier_level);
        w.double(self.ps_ampdelay);
        w.double(self.ps_moxdelay);
        w.double(self.ps_loopdelay);
        assemble(
            Header::default(),
            MessageType::InfoTransmitter,
            &w.into_bytes(),
        )
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            id: r.u8(),
            dac: r.u8(),
            display_detector_mode: r.u8(),
            display_average_mode: r.u8(),
            use_rx_filter: r.flag(),
            alex_antenna: r.u8(),
            puresignal: r.flag(),
            feedback: r.flag(),
            auto_on: r.flag(),
            ps_oneshot: r.flag(),
            ctcss_enabled: r.flag(),
            ctcss: r.u8(),
            pre_emphasize: r.flag(),
            drive: r.u8(),
            tune_use_drive: r.flag(),
            tune_drive: r.u8(),
            compressor: r.flag(),
            cfc: r.flag(),
            cfc_eq: r.flag(),
            dexp: r.flag(),
            dexp_filter: r.flag(),
            eq_enable: r.flag(),
            alcmode: r.u8(),
            fps: r.u16(),
            dexp_filter_low: r.u16(),
            dexp_filter_high: r.u16(),
            dexp_trigger: r.u16(),
            dexp_exp: r.u16(),
            filter_low: r.short(),
            filter_high: r.short(),
            deviation: r.u16(),
            width: r.u16(),
            height: r.u16(),
            attenuation: r.u16(),
            fft_size: r.u64(),
            ..Self::default()
        };
        for v in d.eq_freq.iter_mut() {
            *v = r.double();
        }
        for v in d.eq_gain.iter_mut() {
            *v = r.double();
        }
        d.dexp_tau = r.double();
        d.dexp_attack = r.double();
        d.dexp_release = r.double();
        d.dexp_hold = r.double();
        d.dexp_hyst = r.double();
        for v in d.cfc_freq.iter_mut() {
            *v = r.double();
        }
        for v in d.cfc_lvl.iter_mut() {
            *v = r.double();
        }
        for v in d.cfc_post.iter_mut() {
            *v = r.double();
        }
        d.mic_gain = r.double();
        d.compressor_level = r.double();
        d.display_average_time = r.double();
        d.am_carrier_level = r.double();
        d.ps_ampdelay = r.double();
        d.ps_moxdelay = r.double();
        d.ps_loopdelay = r.double();
        d
    }
}

/// One VFO's full state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct VfoData {
    pub vfo: u8,
    pub band: u8,
    pub bandstack: u8,
    pub mode: u8,
    pub filter: u8,
    pub ctun: bool,
    pub rit_enabled: bool,
    pub xit_enabled: bool,
    pub cw_audio_peak_filter: bool,
    pub rit_step: u16,
    pub deviation: u16,
    pub frequency: i64,
    pub ctun_frequency: i64,
    pub rit: i64,
    pub xit: i64,
    pub lo: i64,
    pub offset: i64,
    pub step: i64,
}

impl VfoData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 9 + 4 + 7 * 8;

    /// Serialize as a complete INFO_VFO message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.vfo);
        w.u8(self.band);
        w.u8(self.bandstack);
        w.u8(self.mode);
        w.u8(self.filter);
        w.flag(self.ctun);
        w.flag(self.rit_enabled);
        w.flag(self.xit_enabled);
        w.flag(self.cw_audio_peak_filter);
        w.u16(self.rit_step);
        w.u16(self.deviation);
        w.i64(self.frequency);
        w.i64(self.ctun_frequency);
        w.i64(self.rit);
        w.i64(self.xit);
        w.i64(self.lo);
        w.i64(self.offset);
        w.i64(self.step);
        assemble(Header::default(), MessageType::InfoVfo, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            vfo: r.u8(),
            band: r.u8(),
            bandstack: r.u8(),
            mode: r.u8(),
            filter: r.u8(),
            ctun: r.flag(),
            rit_enabled: r.flag(),
            xit_enabled: r.flag(),
            cw_audio_peak_filter: r.flag(),
            rit_step: r.u16(),
            deviation: r.u16(),
            frequency: r.i64(),
            ctun_frequency: r.i64(),
            rit: r.i64(),
            xit: r.i64(),
            lo: r.i64(),
            offset: r.i64(),
            step: r.i64(),
        }
    }
}

/// One band table entry.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct BandData {
    pub title: String,
    pub band: u8,
    pub oc_rx: u8,
    pub oc_tx: u8,
    pub alex_rx_antenna: u8,
    pub alex_tx_antenna: u8,
    pub alex_attenuation: u8,
    pub disable_pa: bool,
    pub current: u8,
    pub gain: i32,
    pub pa_calibration: f64,
    pub frequency_min: i64,
    pub frequency_max: i64,
    pub frequency_lo: i64,
    pub error_lo: i64,
}

impl BandData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 16 + 8 + 2 + 8 + 4 * 8;

    /// Serialize as a complete INFO_BAND message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.str(&self.title, 16);
        w.u8(self.band);
        w.u8(self.oc_rx);
        w.u8(self.oc_tx);
        w.u8(self.alex_rx_antenna);
        w.u8(self.alex_tx_antenna);
        w.u8(self.alex_attenuation);
        w.flag(self.disable_pa);
        w.u8(self.current);
        w.short(self.gain);
        w.double(self.pa_calibration);
        w.i64(self.frequency_min);
        w.i64(self.frequency_max);
        w.i64(self.frequency_lo);
        w.i64(self.error_lo);
        assemble(Header::default(), MessageType::InfoBand, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            title: r.str(16),
            band: r.u8(),
            oc_rx: r.u8(),
            oc_tx: r.u8(),
            alex_rx_antenna: r.u8(),
            alex_tx_antenna: r.u8(),
            alex_attenuation: r.u8(),
            disable_pa: r.flag(),
            current: r.u8(),
            gain: r.short(),
            pa_calibration: r.double(),
            frequency_min: r.i64(),
            frequency_max: r.i64(),
            frequency_lo: r.i64(),
            error_lo: r.i64(),
        }
    }
}

/// One bandstack ring entry.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct BandstackData {
    pub band: u8,
    pub stack: u8,
    pub mode: u8,
    pub filter: u8,
    pub ctun: bool,
    pub ctcss_enabled: bool,
    pub ctcss: u8,
    pub deviation: u16,
    pub frequency: i64,
    pub ctun_frequency: i64,
}

impl BandstackData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 7 + 2 + 16;

    /// Serialize as a complete INFO_BANDSTACK message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.band);
        w.u8(self.stack);
        w.u8(self.mode);
        w.u8(self.filter);
        w.flag(self.ctun);
        w.flag(self.ctcss_enabled);
        w.u8(self.ctcss);
        w.u16(self.deviation);
        w.i64(self.frequency);
        w.i64(self.ctun_frequency);
        assemble(
            Header::default(),
            MessageType::InfoBandstack,
            &w.into_bytes(),
        )
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            band: r.u8(),
            stack: r.u8(),
            mode: r.u8(),
            filter: r.u8(),
            ctun: r.flag(),
            ctcss_enabled: r.flag(),
            ctcss: r.u8(),
            deviation: r.u16(),
            frequency: r.i64(),
            ctun_frequency: r.i64(),
        }
    }
}

/// One memory (store/recall) slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct MemoryData {
    pub index: u8,
    pub sat_mode: u8,
    pub ctun: bool,
    pub mode: u8,
    pub filter: u8,
    pub bd: u8,
    pub alt_ctun: bool,
    pub alt_mode: u8,
    pub alt_filter: u8,
    pub alt_bd: u8,
    pub ctcss_enabled: bool,
    pub ctcss: u8,
    pub deviation: u16,
    pub alt_deviation: u16,
    pub frequency: i64,
    pub ctun_frequency: i64,
    pub alt_frequency: i64,
    pub alt_ctun_frequency: i64,
}

impl MemoryData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 12 + 4 + 32;

    /// Serialize as a complete INFO_MEMORY message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.index);
        w.u8(self.sat_mode);
        w.flag(self.ctun);
        w.u8(self.mode);
        w.u8(self.filter);
        w.u8(self.bd);
        w.flag(self.alt_ctun);
        w.u8(self.alt_mode);
        w.u8(self.alt_filter);
        w.u8(self.alt_bd);
        w.flag(self.ctcss_enabled);
        w.u8(self.ctcss);
        w.u16(self.deviation);
        w.u16(self.alt_deviation);
        w.i64(self.frequency);
        w.i64(self.ctun_frequency);
        w.i64(self.alt_frequency);
        w.i64(self.alt_ctun_frequency);
        assemble(Header::default(), MessageType::InfoMemory, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            index: r.u8(),
            sat_mode: r.u8(),
            ctun: r.flag(),
            mode: r.u8(),
            filter: r.u8(),
            bd: r.u8(),
            alt_ctun: r.flag(),
            alt_mode: r.u8(),
            alt_filter: r.u8(),
            alt_bd: r.u8(),
            ctcss_enabled: r.flag(),
            ctcss: r.u8(),
            deviation: r.u16(),
            alt_deviation: r.u16(),
            frequency: r.i64(),
            ctun_frequency: r.i64(),
            alt_frequency: r.i64(),
            alt_ctun_frequency: r.i64(),
        }
    }
}

/// Spectrum frame, the one variable-length message. Also ferries the
/// high-rate VFO and meter values for quick display updates.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct SpectrumData {
    pub id: u8,
    pub zoom: u8,
    pub width: u16,
    pub pan: u16,
    pub vfo_a_freq: i64,
    pub vfo_b_freq: i64,
    pub vfo_a_ctun_freq: i64,
    pub vfo_b_ctun_freq: i64,
    pub vfo_a_offset: i64,
    pub vfo_b_offset: i64,
    pub meter: f64,
    pub alc: f64,
    pub fwd: f64,
    pub swr: f64,
    /// Fixed-point pixel samples, one per displayed pixel.
    pub samples: Vec<i32>,
}

impl SpectrumData {
    /// Body bytes before the sample array.
    pub const FIXED_LEN: usize = 6 + 6 * 8 + 4 * 8;

    /// Serialize as a complete INFO_SPECTRUM message. The payload
    /// length goes into `s1`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let n = std::cmp::min(self.samples.len(), SPECTRUM_DATA_SIZE);
        let mut w = WireWriter::with_capacity(Self::FIXED_LEN + 2 * n);
        w.u8(self.id);
        w.u8(self.zoom);
        w.u16(self.width);
        w.u16(self.pan);
        w.i64(self.vfo_a_freq);
        w.i64(self.vfo_b_freq);
        w.i64(self.vfo_a_ctun_freq);
        w.i64(self.vfo_b_ctun_freq);
        w.i64(self.vfo_a_offset);
        w.i64(self.vfo_b_offset);
        w.double(self.meter);
        w.double(self.alc);
        w.double(self.fwd);
        w.double(self.swr);
        for s in &self.samples[..n] {
            w.short(*s);
        }
        let body = w.into_bytes();
        assemble(
            Header {
                kind: 0,
                b1: 0,
                b2: 0,
                s1: body.len() as u16,
                s2: 0,
            },
            MessageType::InfoSpectrum,
            &body,
        )
    }

    /// Parse a body of `header.s1` bytes.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            id: r.u8(),
            zoom: r.u8(),
            width: r.u16(),
            pan: r.u16(),
            vfo_a_freq: r.i64(),
            vfo_b_freq: r.i64(),
            vfo_a_ctun_freq: r.i64(),
            vfo_b_ctun_freq: r.i64(),
            vfo_a_offset: r.i64(),
            vfo_b_offset: r.i64(),
            meter: r.double(),
            alc: r.double(),
            fwd: r.double(),
            swr: r.double(),
            samples: Vec::new(),
        };
        let n = r.remaining() / 2;
        d.samples.reserve(n);
        for _ in 0..n {
            d.samples.push(r.short());
        }
        d
    }
}

/// Downlink audio: stereo, always a full block.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct RxAudioData {
    pub rx: u8,
    pub numsamples: u16,
    /// Interleaved left/right.
    pub samples: Vec<i16>,
}

impl RxAudioData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 3 + AUDIO_DATA_SIZE * 2 * 2;

    /// Serialize as a complete INFO_RXAUDIO message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.rx);
        w.u16(self.numsamples);
        for i in 0..AUDIO_DATA_SIZE * 2 {
            w.u16(self.samples.get(i).copied().unwrap_or(0) as u16);
        }
        assemble(Header::default(), MessageType::InfoRxAudio, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let rx = r.u8();
        let numsamples = r.u16();
        let mut samples = Vec::with_capacity(AUDIO_DATA_SIZE * 2);
        for _ in 0..AUDIO_DATA_SIZE * 2 {
            samples.push(r.u16() as i16);
        }
        Self {
            rx,
            numsamples,
            samples,
        }
    }
}

/// Uplink audio: mono microphone samples from the client.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct TxAudioData {
    pub rx: u8,
    pub numsamples: u16,
    pub samples: Vec<i16>,
}

impl TxAudioData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 3 + AUDIO_DATA_SIZE * 2;

    /// Serialize as a complete INFO_TXAUDIO message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.rx);
        w.u16(self.numsamples);
        for i in 0..AUDIO_DATA_SIZE {
            w.u16(self.samples.get(i).copied().unwrap_or(0) as u16);
        }
        assemble(Header::default(), MessageType::InfoTxAudio, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let rx = r.u8();
        let numsamples = r.u16();
        let mut samples = Vec::with_capacity(AUDIO_DATA_SIZE);
        for _ in 0..AUDIO_DATA_SIZE {
            samples.push(r.u16() as i16);
        }
        Self {
            rx,
            numsamples,
            samples,
        }
    }
}

/// Panadapter warning flags and levels, sent every 150 ms.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct DisplayData {
    pub adc0_overload: bool,
    pub adc1_overload: bool,
    pub high_swr_seen: bool,
    pub tx_fifo_overrun: bool,
    pub tx_fifo_underrun: bool,
    pub tx_inhibit: bool,
    pub exciter_power: i32,
    pub adc0: i32,
    pub adc1: i32,
    pub sequence_errors: i32,
}

impl DisplayData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 6 + 4 * 2;

    /// Serialize as a complete INFO_DISPLAY message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.flag(self.adc0_overload);
        w.flag(self.adc1_overload);
        w.flag(self.high_swr_seen);
        w.flag(self.tx_fifo_overrun);
        w.flag(self.tx_fifo_underrun);
        w.flag(self.tx_inhibit);
        w.short(self.exciter_power);
        w.short(self.adc0);
        w.short(self.adc1);
        w.short(self.sequence_errors);
        assemble(Header::default(), MessageType::InfoDisplay, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            adc0_overload: r.flag(),
            adc1_overload: r.flag(),
            high_swr_seen: r.flag(),
            tx_fifo_overrun: r.flag(),
            tx_fifo_underrun: r.flag(),
            tx_inhibit: r.flag(),
            exciter_power: r.short(),
            adc0: r.short(),
            adc1: r.short(),
            sequence_errors: r.short(),
        }
    }
}

/// PureSignal status, sent every 150 ms while PS is on.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct PsData {
    pub psinfo: [i32; 16],
    pub attenuation: i32,
    pub ps_getpk: f64,
    pub ps_getmx: f64,
}

impl PsData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 16 * 2 + 2 + 2 * 8;

    /// Serialize as a complete INFO_PS message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        for v in &self.psinfo {
            w.short(*v);
        }
        w.short(self.attenuation);
        w.double(self.ps_getpk);
        w.double(self.ps_getmx);
        assemble(Header::default(), MessageType::InfoPs, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self::default();
        for v in d.psinfo.iter_mut() {
            *v = r.short();
        }
        d.attenuation = r.short();
        d.ps_getpk = r.double();
        d.ps_getmx = r.double();
        d
    }
}

/// The PureSignal parameters a client can change.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct PsParams {
    pub ps_ptol: bool,
    pub ps_oneshot: bool,
    pub ps_map: bool,
    pub ps_setpk: f64,
}

impl PsParams {
    /// Fixed body size.
    pub const BODY_LEN: usize = 3 + 8;

    /// Serialize as a complete CMD_PSPARAMS message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.flag(self.ps_ptol);
        w.flag(self.ps_oneshot);
        w.flag(self.ps_map);
        w.double(self.ps_setpk);
        assemble(Header::default(), MessageType::CmdPsParams, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            ps_ptol: r.flag(),
            ps_oneshot: r.flag(),
            ps_map: r.flag(),
            ps_setpk: r.double(),
        }
    }
}

/// AGC gain/hang/threshold block for one receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct AgcGainCommand {
    pub id: u8,
    pub gain: f64,
    pub hang: f64,
    pub thresh: f64,
    pub hang_thresh: f64,
}

impl AgcGainCommand {
    /// Fixed body size.
    pub const BODY_LEN: usize = 1 + 4 * 8;

    /// Serialize as a complete CMD_AGC_GAIN message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.double(self.gain);
        w.double(self.hang);
        w.double(self.thresh);
        w.double(self.hang_thresh);
        assemble(Header::default(), MessageType::CmdAgcGain, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            id: r.u8(),
            gain: r.double(),
            hang: r.double(),
            thresh: r.double(),
            hang_thresh: r.double(),
        }
    }
}

/// Diversity mixer setting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct DiversityCommand {
    pub enabled: bool,
    pub gain: f64,
    pub phase: f64,
}

impl DiversityCommand {
    /// Fixed body size.
    pub const BODY_LEN: usize = 1 + 2 * 8;

    /// Serialize as a complete CMD_DIVERSITY message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.flag(self.enabled);
        w.double(self.gain);
        w.double(self.phase);
        assemble(
            Header::default(),
            MessageType::CmdDiversity,
            &w.into_bytes(),
        )
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            enabled: r.flag(),
            gain: r.double(),
            phase: r.double(),
        }
    }
}

/// Equalizer state for a receiver (`id` 0/1) or the transmitter.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct EqualizerCommand {
    pub id: u8,
    pub enable: bool,
    pub freq: [f64; EQ_BANDS],
    pub gain: [f64; EQ_BANDS],
}

impl Default for EqualizerCommand {
    fn default() -> Self {
        Self {
            id: 0,
            enable: false,
            freq: [0.0; EQ_BANDS],
            gain: [0.0; EQ_BANDS],
        }
    }
}

impl EqualizerCommand {
    /// Fixed body size.
    pub const BODY_LEN: usize = 2 + 2 * EQ_BANDS * 8;

    /// Serialize under the given type (CMD_RX_EQ or CMD_TX_EQ).
    #[must_use]
    pub fn encode(&self, kind: MessageType) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.flag(self.enable);
        for v in &self.freq {
            w.double(*v);
        }
        for v in &self.gain {
            w.double(*v);
        }
        assemble(Header::default(), kind, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            id: r.u8(),
            enable: r.flag(),
            ..Self::default()
        };
        for v in d.freq.iter_mut() {
            *v = r.double();
        }
        for v in d.gain.iter_mut() {
            *v = r.double();
        }
        d
    }
}

/// Noise blanker / noise reduction parameter block for one receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NoiseCommand {
    pub id: u8,
    pub nb: u8,
    pub nr: u8,
    pub anf: u8,
    pub snb: u8,
    pub nb2_mode: u8,
    pub nr_agc: u8,
    pub nr2_gain_method: u8,
    pub nr2_npe_method: u8,
    pub nr2_ae: u8,
    pub nb_tau: f64,
    pub nb_hang: f64,
    pub nb_advtime: f64,
    pub nb_thresh: f64,
    pub nr2_trained_threshold: f64,
    pub nr2_trained_t2: f64,
    pub nr4_reduction_amount: f64,
    pub nr4_smoothing_factor: f64,
    pub nr4_whitening_factor: f64,
    pub nr4_noise_rescale: f64,
    pub nr4_post_threshold: f64,
}

impl NoiseCommand {
    /// Fixed body size.
    pub const BODY_LEN: usize = 10 + 11 * 8;

    /// Serialize as a complete CMD_NOISE message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.u8(self.nb);
        w.u8(self.nr);
        w.u8(self.anf);
        w.u8(self.snb);
        w.u8(self.nb2_mode);
        w.u8(self.nr_agc);
        w.u8(self.nr2_gain_method);
        w.u8(self.nr2_npe_method);
        w.u8(self.nr2_ae);
        w.double(self.nb_tau);
        w.double(self.nb_hang);
        w.double(self.nb_advtime);
        w.double(self.nb_thresh);
        w.double(self.nr2_trained_threshold);
        w.double(self.nr2_trained_t2);
        w.double(self.nr4_reduction_amount);
        w.double(self.nr4_smoothing_factor);
        w.double(self.nr4_whitening_factor);
        w.double(self.nr4_noise_rescale);
        w.double(self.nr4_post_threshold);
        assemble(Header::default(), MessageType::CmdNoise, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            id: r.u8(),
            nb: r.u8(),
            nr: r.u8(),
            anf: r.u8(),
            snb: r.u8(),
            nb2_mode: r.u8(),
            nr_agc: r.u8(),
            nr2_gain_method: r.u8(),
            nr2_npe_method: r.u8(),
            nr2_ae: r.u8(),
            nb_tau: r.double(),
            nb_hang: r.double(),
            nb_advtime: r.double(),
            nb_thresh: r.double(),
            nr2_trained_threshold: r.double(),
            nr2_trained_t2: r.double(),
            nr4_reduction_amount: r.double(),
            nr4_smoothing_factor: r.double(),
            nr4_whitening_factor: r.double(),
            nr4_noise_rescale: r.double(),
            nr4_post_threshold: r.double(),
        }
    }
}

/// Compressor and CFC block.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct CompressorData {
    pub compressor: bool,
    pub cfc: bool,
    pub cfc_eq: bool,
    pub compressor_level: f64,
    pub cfc_freq: [f64; EQ_BANDS],
    pub cfc_lvl: [f64; EQ_BANDS],
    pub cfc_post: [f64; EQ_BANDS],
}

impl Default for CompressorData {
    fn default() -> Self {
        Self {
            compressor: false,
            cfc: false,
            cfc_eq: false,
            compressor_level: 0.0,
            cfc_freq: [0.0; EQ_BANDS],
            cfc_lvl: [0.0; EQ_BANDS],
            cfc_post: [0.0; EQ_BANDS],
        }
    }
}

impl CompressorData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 3 + 8 + 3 * EQ_BANDS * 8;

    /// Serialize as a complete CMD_COMPRESSOR message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.flag(self.compressor);
        w.flag(self.cfc);
        w.flag(self.cfc_eq);
        w.double(self.compressor_level);
        for v in &self.cfc_freq {
            w.double(*v);
        }
        for v in &self.cfc_lvl {
            w.double(*v);
        }
        for v in &self.cfc_post {
            w.double(*v);
        }
        assemble(
            Header::default(),
            MessageType::CmdCompressor,
            &w.into_bytes(),
        )
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            compressor: r.flag(),
            cfc: r.flag(),
            cfc_eq: r.flag(),
            compressor_level: r.double(),
            ..Self::default()
        };
        for v in d.cfc_freq.iter_mut() {
            *v = r.double();
        }
        for v in d.cfc_lvl.iter_mut() {
            *v = r.double();
        }
        for v in d.cfc_post.iter_mut() {
            *v = r.double();
        }
        d
    }
}

/// Downward expander block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct DexpData {
    pub dexp: bool,
    pub dexp_filter: bool,
    pub dexp_trigger: u16,
    pub dexp_exp: u16,
    pub dexp_filter_low: u16,
    pub dexp_filter_high: u16,
    pub dexp_tau: f64,
    pub dexp_attack: f64,
    pub dexp_release: f64,
    pub dexp_hold: f64,
    pub dexp_hyst: f64,
}

impl DexpData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 2 + 4 * 2 + 5 * 8;

    /// Serialize as a complete CMD_DEXP message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.flag(self.dexp);
        w.flag(self.dexp_filter);
        w.u16(self.dexp_trigger);
        w.u16(self.dexp_exp);
        w.u16(self.dexp_filter_low);
        w.u16(self.dexp_filter_high);
        w.double(self.dexp_tau);
        w.double(self.dexp_attack);
        w.double(self.dexp_release);
        w.double(self.dexp_hold);
        w.double(self.dexp_hyst);
        assemble(Header::default(), MessageType::CmdDexp, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            dexp: r.flag(),
            dexp_filter: r.flag(),
            dexp_trigger: r.u16(),
            dexp_exp: r.u16(),
            dexp_filter_low: r.u16(),
            dexp_filter_high: r.u16(),
            dexp_tau: r.double(),
            dexp_attack: r.double(),
            dexp_release: r.double(),
            dexp_hold: r.double(),
            dexp_hyst: r.double(),
        }
    }
}

/// PA calibration table.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct PaTrimData {
    pub pa_power: u16,
    pub pa_trim: [f64; EQ_BANDS],
}

impl Default for PaTrimData {
    fn default() -> Self {
        Self {
            pa_power: 0,
            pa_trim: [0.0; EQ_BANDS],
        }
    }
}

impl PaTrimData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 2 + EQ_BANDS * 8;

    /// Serialize as a complete CMD_PATRIM message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u16(self.pa_power);
        for v in &self.pa_trim {
            w.double(*v);
        }
        assemble(Header::default(), MessageType::CmdPaTrim, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        let mut d = Self {
            pa_power: r.u16(),
            ..Self::default()
        };
        for v in d.pa_trim.iter_mut() {
            *v = r.double();
        }
        d
    }
}

/// Radio-menu scalars that need no special processing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct RadioMenuData {
    pub sat_mode: u8,
    pub mic_ptt_enabled: bool,
    pub mic_bias_enabled: bool,
    pub mic_ptt_tip_bias_ring: bool,
    pub mic_input_xlr: bool,
    pub pa_enabled: bool,
    pub mute_spkr_amp: bool,
    pub soapy_iqswap: bool,
    pub enable_tx_inhibit: bool,
    pub enable_auto_tune: bool,
    pub new_pa_board: bool,
    pub tx_out_of_band_allowed: bool,
    pub oc_tune: u8,
    pub full_tune: bool,
    pub memory_tune: bool,
    pub rx_gain_calibration: i32,
    pub oc_full_tune_time: u16,
    pub oc_memory_tune_time: u16,
    pub frequency_calibration: i64,
}

impl RadioMenuData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 15 + 3 * 2 + 8;

    /// Serialize as a complete CMD_RADIOMENU message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.sat_mode);
        w.flag(self.mic_ptt_enabled);
        w.flag(self.mic_bias_enabled);
        w.flag(self.mic_ptt_tip_bias_ring);
        w.flag(self.mic_input_xlr);
        w.flag(self.pa_enabled);
        w.flag(self.mute_spkr_amp);
        w.flag(self.soapy_iqswap);
        w.flag(self.enable_tx_inhibit);
        w.flag(self.enable_auto_tune);
        w.flag(self.new_pa_board);
        w.flag(self.tx_out_of_band_allowed);
        w.u8(self.oc_tune);
        w.flag(self.full_tune);
        w.flag(self.memory_tune);
        w.short(self.rx_gain_calibration);
        w.u16(self.oc_full_tune_time);
        w.u16(self.oc_memory_tune_time);
        w.i64(self.frequency_calibration);
        assemble(
            Header::default(),
            MessageType::CmdRadioMenu,
            &w.into_bytes(),
        )
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            sat_mode: r.u8(),
            mic_ptt_enabled: r.flag(),
            mic_bias_enabled: r.flag(),
            mic_ptt_tip_bias_ring: r.flag(),
            mic_input_xlr: r.flag(),
            pa_enabled: r.flag(),
            mute_spkr_amp: r.flag(),
            soapy_iqswap: r.flag(),
            enable_tx_inhibit: r.flag(),
            enable_auto_tune: r.flag(),
            new_pa_board: r.flag(),
            tx_out_of_band_allowed: r.flag(),
            oc_tune: r.u8(),
            full_tune: r.flag(),
            memory_tune: r.flag(),
            rx_gain_calibration: r.short(),
            oc_full_tune_time: r.u16(),
            oc_memory_tune_time: r.u16(),
            frequency_calibration: r.i64(),
        }
    }
}

/// RX-menu scalars (per-id ADC options plus global bypass flags).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct RxMenuData {
    pub id: u8,
    pub dither: bool,
    pub random: bool,
    pub preamp: bool,
    pub adc0_filter_bypass: bool,
    pub adc1_filter_bypass: bool,
}

impl RxMenuData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 6;

    /// Serialize as a complete CMD_RXMENU message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.id);
        w.flag(self.dither);
        w.flag(self.random);
        w.flag(self.preamp);
        w.flag(self.adc0_filter_bypass);
        w.flag(self.adc1_filter_bypass);
        assemble(Header::default(), MessageType::CmdRxMenu, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            id: r.u8(),
            dither: r.flag(),
            random: r.flag(),
            preamp: r.flag(),
            adc0_filter_bypass: r.flag(),
            adc1_filter_bypass: r.flag(),
        }
    }
}

/// TX-menu scalars.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct TxMenuData {
    pub tune_drive: u8,
    pub tune_use_drive: bool,
    pub swr_protection: bool,
    pub mic_boost: bool,
    pub mic_linein: bool,
    pub linein_gain: f64,
    pub swr_alarm: f64,
}

impl TxMenuData {
    /// Fixed body size.
    pub const BODY_LEN: usize = 5 + 2 * 8;

    /// Serialize as a complete CMD_TXMENU message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::BODY_LEN);
        w.u8(self.tune_drive);
        w.flag(self.tune_use_drive);
        w.flag(self.swr_protection);
        w.flag(self.mic_boost);
        w.flag(self.mic_linein);
        w.double(self.linein_gain);
        w.double(self.swr_alarm);
        assemble(Header::default(), MessageType::CmdTxMenu, &w.into_bytes())
    }

    /// Parse a body.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        let mut r = WireReader::new(body);
        Self {
            tune_drive: r.u8(),
            tune_use_drive: r.flag(),
            swr_protection: r.flag(),
            mic_boost: r.flag(),
            mic_linein: r.flag(),
            linein_gain: r.double(),
            swr_alarm: r.double(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{HEADER_SIZE, SYNC};

    #[test]
    fn opcode_values_are_contiguous() {
        for (i, t) in MessageType::ALL.iter().enumerate() {
            assert_eq!(*t as u16 as usize, i);
            assert_eq!(MessageType::from_u16(i as u16), Some(*t));
        }
        assert_eq!(MessageType::from_u16(MessageType::ALL.len() as u16), None);
    }

    #[test]
    fn every_message_starts_with_sync() {
        let msgs: Vec<Vec<u8>> = vec![
            header_only(MessageType::CmdPtt, 1, 0, 0, 0),
            u64_command(MessageType::CmdFreq, 0, 0, 14_250_000),
            double_command(MessageType::CmdDrive, 0, 0, 37.5),
            RadioData::default().encode(),
            ReceiverData::default().encode(),
            TransmitterData::default().encode(),
            VfoData::default().encode(),
            SpectrumData::default().encode(),
            DisplayData::default().encode(),
        ];
        for m in msgs {
            assert_eq!(m[0..4], SYNC);
        }
    }

    #[test]
    fn fixed_sizes_match_encodings() {
        fn body_len(m: &[u8]) -> usize {
            m.len() - HEADER_SIZE
        }
        assert_eq!(body_len(&RadioData::default().encode()), RadioData::BODY_LEN);
        assert_eq!(
            body_len(&ReceiverData::default().encode()),
            ReceiverData::BODY_LEN
        );
        assert_eq!(
            body_len(&TransmitterData::default().encode()),
            TransmitterData::BODY_LEN
        );
        assert_eq!(body_len(&VfoData::default().encode()), VfoData::BODY_LEN);
        assert_eq!(body_len(&BandData::default().encode()), BandData::BODY_LEN);
        assert_eq!(
            body_len(&BandstackData::default().encode()),
            BandstackData::BODY_LEN
        );
        assert_eq!(
            body_len(&MemoryData::default().encode()),
            MemoryData::BODY_LEN
        );
        assert_eq!(body_len(&AdcData::default().encode()), AdcData::BODY_LEN);
        assert_eq!(body_len(&DacData::default().encode()), DacData::BODY_LEN);
        assert_eq!(
            body_len(&DisplayData::default().encode()),
            DisplayData::BODY_LEN
        );
        assert_eq!(body_len(&PsData::default().encode()), PsData::BODY_LEN);
        assert_eq!(body_len(&PsParams::default().encode()), PsParams::BODY_LEN);
        assert_eq!(
            body_len(&AgcGainCommand::default().encode()),
            AgcGainCommand::BODY_LEN
        );
        assert_eq!(
            body_len(&DiversityCommand::default().encode()),
            DiversityCommand::BODY_LEN
        );
        assert_eq!(
            body_len(&EqualizerCommand::default().encode(MessageType::CmdRxEq)),
            EqualizerCommand::BODY_LEN
        );
        assert_eq!(
            body_len(&NoiseCommand::default().encode()),
            NoiseCommand::BODY_LEN
        );
        assert_eq!(
            body_len(&CompressorData::default().encode()),
            CompressorData::BODY_LEN
        );
        assert_eq!(body_len(&DexpData::default().encode()), DexpData::BODY_LEN);
        assert_eq!(
            body_len(&PaTrimData::default().encode()),
            PaTrimData::BODY_LEN
        );
        assert_eq!(
            body_len(&RadioMenuData::default().encode()),
            RadioMenuData::BODY_LEN
        );
        assert_eq!(
            body_len(&RxMenuData::default().encode()),
            RxMenuData::BODY_LEN
        );
        assert_eq!(
            body_len(&TxMenuData::default().encode()),
            TxMenuData::BODY_LEN
        );
        let rxa = RxAudioData {
            rx: 0,
            numsamples: 0,
            samples: vec![],
        };
        assert_eq!(body_len(&rxa.encode()), RxAudioData::BODY_LEN);
        let txa = TxAudioData {
            rx: 0,
            numsamples: 0,
            samples: vec![],
        };
        assert_eq!(body_len(&txa.encode()), TxAudioData::BODY_LEN);
    }

    #[test]
    fn receiver_roundtrip() {
        let mut d = ReceiverData {
            id: 1,
            adc: 1,
            agc: 2,
            zoom: 4,
            filter_low: -2850,
            filter_high: -150,
            pan: 400,
            width: 800,
            hz_per_pixel: 48000.0 / 1600.0,
            volume: -12.5,
            sample_rate: 384000,
            fft_size: 2048,
            ..ReceiverData::default()
        };
        d.eq_freq[3] = 500.0;
        d.eq_gain[3] = -3.0;
        let wire = d.encode();
        let got = ReceiverData::decode(&wire[HEADER_SIZE..]);
        assert_eq!(got.id, 1);
        assert_eq!(got.filter_low, -2850);
        assert_eq!(got.filter_high, -150);
        assert_eq!(got.sample_rate, 384000);
        assert!((got.volume - -12.5).abs() < 1e-6);
        assert!((got.eq_gain[3] - -3.0).abs() < 1e-6);
    }

    #[test]
    fn spectrum_payload_length() {
        // Width 800 at zoom 2: 1600 pixels sampled, 800 sent.
        let d = SpectrumData {
            id: 0,
            zoom: 2,
            width: 800,
            pan: 0,
            samples: (0..800).collect(),
            ..SpectrumData::default()
        };
        let wire = d.encode();
        let h = crate::frame::Header::from_body(&wire[4..HEADER_SIZE]);
        assert_eq!(h.s1 as usize, SpectrumData::FIXED_LEN + 2 * 800);
        assert_eq!(wire.len(), HEADER_SIZE + h.s1 as usize);
        let got = SpectrumData::decode(&wire[HEADER_SIZE..]);
        assert_eq!(got.samples.len(), 800);
        assert_eq!(got.samples[799], 799);
    }

    #[test]
    fn vfo_roundtrip_negative_rit() {
        let d = VfoData {
            vfo: 1,
            frequency: 7_030_000,
            rit: -200,
            rit_enabled: true,
            step: 25,
            ..VfoData::default()
        };
        let wire = d.encode();
        let got = VfoData::decode(&wire[HEADER_SIZE..]);
        assert_eq!(got, d);
    }
}
/* vim: textwidth=80
 */
