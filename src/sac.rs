use log::{debug, warn};
use std::io::Write;

use crate::byte_order::ByteOrder;
use crate::hptime::{HpTime, HPTMODULUS};
use crate::mseed_error::MSeedError;
use crate::trace::Segment;

/// SAC header length in bytes.
pub const SAC_HEADER_LEN: usize = 632;

/// Number of float header variables, 4 bytes each.
pub const NUM_FLOAT_HDR: usize = 70;

/// Number of integer header variables, 4 bytes each.
pub const NUM_INT_HDR: usize = 40;

/// Number of string header variables, 22x8 bytes plus 1x16 bytes.
pub const NUM_STR_HDR: usize = 23;

/// Undefined sentinel for float header variables.
pub const FUNDEF: f32 = -12345.0;

/// Undefined sentinel for integer header variables.
pub const IUNDEF: i32 = -12345;

/// Undefined sentinel for string header variables.
pub const SUNDEF: &str = "-12345  ";

/// SAC file type: time series data.
pub const ITIME: i32 = 1;

/// SAC header version written here.
pub const SAC_VERSION: i32 = 6;

/// The SAC header as it exists in binary SAC files: 70 floats, 40 integers
/// and 23 fixed width strings, 632 bytes in all.
#[derive(Debug, Clone)]
pub struct SacHeader {
    pub delta: f32,
    pub depmin: f32,
    pub depmax: f32,
    pub scale: f32,
    pub odelta: f32,
    pub b: f32,
    pub e: f32,
    pub o: f32,
    pub a: f32,
    pub fmt: f32,
    pub t: [f32; 10],
    pub f: f32,
    pub resp: [f32; 10],
    pub stla: f32,
    pub stlo: f32,
    pub stel: f32,
    pub stdp: f32,
    pub evla: f32,
    pub evlo: f32,
    pub evel: f32,
    pub evdp: f32,
    pub mag: f32,
    pub user: [f32; 10],
    pub dist: f32,
    pub az: f32,
    pub baz: f32,
    pub gcarc: f32,
    pub sb: f32,
    pub sdelta: f32,
    pub depmen: f32,
    pub cmpaz: f32,
    pub cmpinc: f32,
    pub xminimum: f32,
    pub xmaximum: f32,
    pub yminimum: f32,
    pub ymaximum: f32,
    pub unused_f: [f32; 7],
    pub nzyear: i32,
    pub nzjday: i32,
    pub nzhour: i32,
    pub nzmin: i32,
    pub nzsec: i32,
    pub nzmsec: i32,
    pub nvhdr: i32,
    pub norid: i32,
    pub nevid: i32,
    pub npts: i32,
    pub nsnpts: i32,
    pub nwfid: i32,
    pub nxsize: i32,
    pub nysize: i32,
    pub unused15: i32,
    pub iftype: i32,
    pub idep: i32,
    pub iztype: i32,
    pub unused16: i32,
    pub iinst: i32,
    pub istreg: i32,
    pub ievreg: i32,
    pub ievtyp: i32,
    pub iqual: i32,
    pub isynth: i32,
    pub imagtyp: i32,
    pub imagsrc: i32,
    pub unused_i: [i32; 8],
    pub leven: i32,
    pub lpspol: i32,
    pub lovrok: i32,
    pub lcalda: i32,
    pub unused27: i32,
    pub kstnm: [u8; 8],
    pub kevnm: [u8; 16],
    pub khole: [u8; 8],
    pub ko: [u8; 8],
    pub ka: [u8; 8],
    pub kt: [[u8; 8]; 10],
    pub kf: [u8; 8],
    pub kuser0: [u8; 8],
    pub kuser1: [u8; 8],
    pub kuser2: [u8; 8],
    pub kcmpnm: [u8; 8],
    pub knetwk: [u8; 8],
    pub kdatrd: [u8; 8],
    pub kinst: [u8; 8],
}

impl Default for SacHeader {
    /// The null header: every float and integer set to -12345 and every
    /// string to "-12345" space padded.
    fn default() -> SacHeader {
        let undef8 = *b"-12345  ";
        SacHeader {
            delta: FUNDEF,
            depmin: FUNDEF,
            depmax: FUNDEF,
            scale: FUNDEF,
            odelta: FUNDEF,
            b: FUNDEF,
            e: FUNDEF,
            o: FUNDEF,
            a: FUNDEF,
            fmt: FUNDEF,
            t: [FUNDEF; 10],
            f: FUNDEF,
            resp: [FUNDEF; 10],
            stla: FUNDEF,
            stlo: FUNDEF,
            stel: FUNDEF,
            stdp: FUNDEF,
            evla: FUNDEF,
            evlo: FUNDEF,
            evel: FUNDEF,
            evdp: FUNDEF,
            mag: FUNDEF,
            user: [FUNDEF; 10],
            dist: FUNDEF,
            az: FUNDEF,
            baz: FUNDEF,
            gcarc: FUNDEF,
            sb: FUNDEF,
            sdelta: FUNDEF,
            depmen: FUNDEF,
            cmpaz: FUNDEF,
            cmpinc: FUNDEF,
            xminimum: FUNDEF,
            xmaximum: FUNDEF,
            yminimum: FUNDEF,
            ymaximum: FUNDEF,
            unused_f: [FUNDEF; 7],
            nzyear: IUNDEF,
            nzjday: IUNDEF,
            nzhour: IUNDEF,
            nzmin: IUNDEF,
            nzsec: IUNDEF,
            nzmsec: IUNDEF,
            nvhdr: IUNDEF,
            norid: IUNDEF,
            nevid: IUNDEF,
            npts: IUNDEF,
            nsnpts: IUNDEF,
            nwfid: IUNDEF,
            nxsize: IUNDEF,
            nysize: IUNDEF,
            unused15: IUNDEF,
            iftype: IUNDEF,
            idep: IUNDEF,
            iztype: IUNDEF,
            unused16: IUNDEF,
            iinst: IUNDEF,
            istreg: IUNDEF,
            ievreg: IUNDEF,
            ievtyp: IUNDEF,
            iqual: IUNDEF,
            isynth: IUNDEF,
            imagtyp: IUNDEF,
            imagsrc: IUNDEF,
            unused_i: [IUNDEF; 8],
            leven: IUNDEF,
            lpspol: IUNDEF,
            lovrok: IUNDEF,
            lcalda: IUNDEF,
            unused27: IUNDEF,
            kstnm: undef8,
            kevnm: *b"-12345          ",
            khole: undef8,
            ko: undef8,
            ka: undef8,
            kt: [undef8; 10],
            kf: undef8,
            kuser0: undef8,
            kuser1: undef8,
            kuser2: undef8,
            kcmpnm: undef8,
            knetwk: undef8,
            kdatrd: undef8,
            kinst: undef8,
        }
    }
}

/// Copy a string into a fixed width SAC header field, NUL padded on the
/// right when shorter and silently truncated when longer.
pub fn set_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    for (i, slot) in field.iter_mut().enumerate() {
        *slot = if i < bytes.len() { bytes[i] } else { 0 };
    }
}

impl SacHeader {
    /// The 70 float variables in binary layout order.
    pub fn floats(&self) -> [f32; NUM_FLOAT_HDR] {
        let mut out = [0.0f32; NUM_FLOAT_HDR];
        let mut i = 0;
        let mut push = |v: f32| {
            out[i] = v;
            i += 1;
        };
        push(self.delta);
        push(self.depmin);
        push(self.depmax);
        push(self.scale);
        push(self.odelta);
        push(self.b);
        push(self.e);
        push(self.o);
        push(self.a);
        push(self.fmt);
        for v in self.t {
            push(v);
        }
        push(self.f);
        for v in self.resp {
            push(v);
        }
        push(self.stla);
        push(self.stlo);
        push(self.stel);
        push(self.stdp);
        push(self.evla);
        push(self.evlo);
        push(self.evel);
        push(self.evdp);
        push(self.mag);
        for v in self.user {
            push(v);
        }
        push(self.dist);
        push(self.az);
        push(self.baz);
        push(self.gcarc);
        push(self.sb);
        push(self.sdelta);
        push(self.depmen);
        push(self.cmpaz);
        push(self.cmpinc);
        push(self.xminimum);
        push(self.xmaximum);
        push(self.yminimum);
        push(self.ymaximum);
        for v in self.unused_f {
            push(v);
        }
        out
    }

    /// The 40 integer variables in binary layout order.
    pub fn ints(&self) -> [i32; NUM_INT_HDR] {
        let mut out = [0i32; NUM_INT_HDR];
        let mut i = 0;
        let mut push = |v: i32| {
            out[i] = v;
            i += 1;
        };
        push(self.nzyear);
        push(self.nzjday);
        push(self.nzhour);
        push(self.nzmin);
        push(self.nzsec);
        push(self.nzmsec);
        push(self.nvhdr);
        push(self.norid);
        push(self.nevid);
        push(self.npts);
        push(self.nsnpts);
        push(self.nwfid);
        push(self.nxsize);
        push(self.nysize);
        push(self.unused15);
        push(self.iftype);
        push(self.idep);
        push(self.iztype);
        push(self.unused16);
        push(self.iinst);
        push(self.istreg);
        push(self.ievreg);
        push(self.ievtyp);
        push(self.iqual);
        push(self.isynth);
        push(self.imagtyp);
        push(self.imagsrc);
        for v in self.unused_i {
            push(v);
        }
        push(self.leven);
        push(self.lpspol);
        push(self.lovrok);
        push(self.lcalda);
        push(self.unused27);
        out
    }

    /// The 192 string bytes in binary layout order.
    pub fn strings(&self) -> [u8; 192] {
        let mut out = [0u8; 192];
        let mut pos = 0;
        let mut push = |field: &[u8]| {
            out[pos..pos + field.len()].copy_from_slice(field);
            pos += field.len();
        };
        push(&self.kstnm);
        push(&self.kevnm);
        push(&self.khole);
        push(&self.ko);
        push(&self.ka);
        for kt in &self.kt {
            push(kt);
        }
        push(&self.kf);
        push(&self.kuser0);
        push(&self.kuser1);
        push(&self.kuser2);
        push(&self.kcmpnm);
        push(&self.knetwk);
        push(&self.kdatrd);
        push(&self.kinst);
        out
    }

    /// Binary serialisation, floats and integers in the given byte order,
    /// strings never swapped. Exactly 632 bytes.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = vec![0u8; SAC_HEADER_LEN];
        for (i, v) in self.floats().iter().enumerate() {
            order.write_f32(&mut out[4 * i..4 * i + 4], *v);
        }
        let int_base = 4 * NUM_FLOAT_HDR;
        for (i, v) in self.ints().iter().enumerate() {
            order.write_i32(&mut out[int_base + 4 * i..int_base + 4 * i + 4], *v);
        }
        let str_base = int_base + 4 * NUM_INT_HDR;
        out[str_base..].copy_from_slice(&self.strings());
        out
    }

    /// Alphanumeric serialisation of the header: 5 floats per line at
    /// `%#15.7g`, 5 integers per line at `%10d`, then the strings 3 per
    /// line except the first line which holds the 8-char station name and
    /// the 16-char event name.
    pub fn to_alpha(&self) -> String {
        let mut out = String::new();
        let floats = self.floats();
        for chunk in floats.chunks(5) {
            for v in chunk {
                out.push_str(&format_g15(*v as f64));
            }
            out.push('\n');
        }
        let ints = self.ints();
        for chunk in ints.chunks(5) {
            for v in chunk {
                out.push_str(&format!("{:>10}", v));
            }
            out.push('\n');
        }
        let strings = self.strings();
        // string area addressed in 8-byte units, the event name taking two
        let mut unit = 0;
        while unit < NUM_STR_HDR + 1 {
            if unit == 0 {
                out.push_str(&alpha_field(&strings[0..8], 8));
                out.push_str(&alpha_field(&strings[8..24], 16));
                unit += 3;
            } else {
                for u in unit..(unit + 3).min(NUM_STR_HDR + 1) {
                    out.push_str(&alpha_field(&strings[8 * u..8 * u + 8], 8));
                }
                unit += 3;
            }
            out.push('\n');
        }
        out
    }
}

/// Render a string field like printf "%-8.8s": stop at the first NUL, left
/// justify, space pad to the width.
fn alpha_field(bytes: &[u8], width: usize) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let mut s: String = bytes[..end].iter().map(|&b| b as char).collect();
    while s.len() < width {
        s.push(' ');
    }
    s.truncate(width);
    s
}

/// Format a value like printf "%#15.7g": 7 significant digits, trailing
/// zeros kept, scientific notation outside the fixed point range, right
/// justified in 15 columns.
pub fn format_g15(v: f64) -> String {
    format!("{:>15}", format_g(v, 7))
}

fn format_g(v: f64, precision: i32) -> String {
    if v == 0.0 {
        return format!("{:.*}", (precision - 1) as usize, 0.0);
    }
    // exponent after rounding to the requested significant digits
    let rounded = format!("{:.*e}", (precision - 1) as usize, v);
    let (mantissa, exp_str) = rounded.split_once('e').unwrap();
    let exp: i32 = exp_str.parse().unwrap();
    if exp < -4 || exp >= precision {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (precision - 1 - exp).max(0) as usize;
        format!("{:.*}", decimals, v)
    }
}

/// Macro-equivalent float comparison used by the original delaz: equal
/// within 10 decimal places scaled by magnitude.
fn flt_equal(f1: f64, f2: f64) -> bool {
    (f1 - f2).abs() < 1.0e-10 * (f1.abs() + f2.abs() + 1.0)
}

/// Angular distance, kilometre distance, azimuth and back azimuth between
/// two coordinates. Latitudes are converted to geocentric latitudes using
/// the WGS84 spheroid to correct for ellipticity.
///
/// Returns (delta degrees, distance km at 111.19 km/deg, azimuth 1->2,
/// back azimuth 2->1), azimuths normalised to [0, 360).
pub fn delaz(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64, f64, f64) {
    const SEMIMAJOR: f64 = 6_378_137.0;
    const SEMIMINOR: f64 = 6_356_752.3142;

    let ratio2 = (SEMIMINOR * SEMIMINOR) / (SEMIMAJOR * SEMIMAJOR);
    let pirad = std::f64::consts::PI / 180.0;
    let halfpi = std::f64::consts::FRAC_PI_2;

    let nlat1 = (ratio2 * (lat1 * pirad).tan()).atan();
    let nlat2 = (ratio2 * (lat2 * pirad).tan()).atan();

    let gamma = (lon2 - lon1) * pirad;
    let a = halfpi - nlat2;
    let b = halfpi - nlat1;

    let sita = if a == 0.0 {
        1.0
    } else if nlat2 == 0.0 {
        0.0
    } else {
        b.sin() / a.tan()
    };
    let bsita = if b == 0.0 {
        1.0
    } else if nlat1 == 0.0 {
        0.0
    } else {
        a.sin() / b.tan()
    };

    let mut delta = (a.cos() * b.cos() + a.sin() * b.sin() * gamma.cos()).acos() / pirad;
    if flt_equal(delta, 0.0) {
        delta = 0.0;
    }

    let mut dist = delta * 111.19;
    if flt_equal(dist, 0.0) {
        dist = 0.0;
    }

    let mut azimuth = gamma.sin().atan2(sita - gamma.cos() * b.cos()) / pirad;
    if flt_equal(azimuth, 0.0) {
        azimuth = 0.0;
    } else if azimuth < 0.0 {
        azimuth += 360.0;
    }

    let mut backazimuth = (-gamma.sin()).atan2(bsita - gamma.cos() * a.cos()) / pirad;
    if flt_equal(backazimuth, 0.0) {
        backazimuth = 0.0;
    } else if backazimuth < 0.0 {
        backazimuth += 360.0;
    }

    (delta, dist, azimuth, backazimuth)
}

/// SAC output layout variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SacFormat {
    /// Alphanumeric text.
    Alpha,
    /// Binary in host byte order.
    Binary,
    /// Binary, little endian.
    BinaryLittleEndian,
    /// Binary, big endian.
    BinaryBigEndian,
}

impl SacFormat {
    pub fn is_alpha(self) -> bool {
        self == SacFormat::Alpha
    }

    fn byte_order(self) -> ByteOrder {
        match self {
            SacFormat::BinaryLittleEndian => ByteOrder::Little,
            SacFormat::BinaryBigEndian => ByteOrder::Big,
            _ => ByteOrder::host(),
        }
    }
}

/// Event parameters inserted into the SAC header when known.
#[derive(Debug, Clone, Default)]
pub struct SacEvent {
    pub time: Option<HpTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub depth: Option<f64>,
    pub name: Option<String>,
}

/// Resolved values for the SAC writer. Metadata and selection parsing is a
/// front end concern; by the time this struct exists everything is plain
/// numbers and strings.
#[derive(Debug, Clone)]
pub struct SacConfig {
    pub format: SacFormat,
    /// Reuse existing file names instead of adding a -N disambiguator.
    pub overwrite: bool,
    /// Substitute the rate derived from the segment's time span when it
    /// disagrees with the reported rate.
    pub derive_rate: bool,
    pub network: Option<String>,
    pub station: Option<String>,
    pub location: Option<String>,
    pub channel: Option<String>,
    pub station_latitude: Option<f64>,
    pub station_longitude: Option<f64>,
    pub station_elevation: Option<f64>,
    pub station_depth: Option<f64>,
    pub component_azimuth: Option<f64>,
    pub component_incidence: Option<f64>,
    pub instrument: Option<String>,
    pub scale: Option<f64>,
    pub event: Option<SacEvent>,
}

impl Default for SacConfig {
    fn default() -> SacConfig {
        SacConfig {
            format: SacFormat::Binary,
            overwrite: false,
            derive_rate: false,
            network: None,
            station: None,
            location: None,
            channel: None,
            station_latitude: None,
            station_longitude: None,
            station_elevation: None,
            station_depth: None,
            component_azimuth: None,
            component_incidence: None,
            instrument: None,
            scale: None,
            event: None,
        }
    }
}

/// Build the SAC header and float data for a segment. The segment's
/// samples are cast to float32; integer and double sample types convert,
/// ASCII does not.
pub fn build_header(seg: &Segment, config: &SacConfig) -> Result<(SacHeader, Vec<f32>), MSeedError> {
    if seg.samples.is_empty() || seg.sample_rate == 0.0 {
        return Err(MSeedError::OutOfRange(format!(
            "segment {} has no time series to write",
            seg.srcname(false)
        )));
    }

    let mut sample_rate = seg.sample_rate;
    let npts = seg.samples.len() as i64;

    // Check the reported sample rate against the one derived from the
    // segment's time span
    if seg.start_time < seg.end_time {
        let projected = ((npts - 1) as f64 * HPTMODULUS as f64 / sample_rate) as i64;
        let shift = (seg.end_time - seg.start_time - projected).abs();
        let hpdelta = HPTMODULUS as f64 / sample_rate;
        if (shift as f64) > hpdelta * 0.5 {
            let derived =
                (npts - 1) as f64 * HPTMODULUS as f64 / (seg.end_time - seg.start_time) as f64;
            if config.derive_rate {
                debug!(
                    "using derived sample rate of {} over reported rate of {}",
                    derived, sample_rate
                );
                sample_rate = derived;
            } else {
                warn!(
                    "[{}] reported sample rate different than derived rate ({} versus {})",
                    seg.srcname(false),
                    sample_rate,
                    derived
                );
            }
        }
    }

    let mut sh = SacHeader::default();

    let network = config.network.as_deref().unwrap_or(&seg.network);
    let station = config.station.as_deref().unwrap_or(&seg.station);
    let location = config.location.as_deref().unwrap_or(&seg.location);
    let channel = config.channel.as_deref().unwrap_or(&seg.channel);
    if !network.is_empty() {
        set_field(&mut sh.knetwk, network);
    }
    if !station.is_empty() {
        set_field(&mut sh.kstnm, station);
    }
    if !location.is_empty() {
        set_field(&mut sh.khole, location);
    }
    if !channel.is_empty() {
        set_field(&mut sh.kcmpnm, channel);
    }

    sh.nvhdr = SAC_VERSION;
    sh.leven = 1; // evenly spaced data
    sh.iftype = ITIME;

    sh.delta = (1.0 / sample_rate) as f32;
    sh.npts = npts as i32;

    if let Some(v) = config.station_latitude {
        sh.stla = v as f32;
    }
    if let Some(v) = config.station_longitude {
        sh.stlo = v as f32;
    }
    if let Some(v) = config.station_elevation {
        sh.stel = v as f32;
    }
    if let Some(v) = config.station_depth {
        sh.stdp = v as f32;
    }
    if let Some(v) = config.component_azimuth {
        sh.cmpaz = v as f32;
    }
    if let Some(v) = config.component_incidence {
        sh.cmpinc = v as f32;
    }
    if let Some(v) = &config.instrument {
        set_field(&mut sh.kinst, v);
    }
    if let Some(v) = config.scale {
        sh.scale = v as f32;
    }

    if let Some(event) = &config.event {
        if let Some(t) = event.time {
            // event origin as whole seconds before/after the series start
            sh.o = ((t - seg.start_time) / HPTMODULUS) as f32;
        }
        if let Some(v) = event.latitude {
            sh.evla = v as f32;
        }
        if let Some(v) = event.longitude {
            sh.evlo = v as f32;
        }
        if let Some(v) = event.depth {
            sh.evdp = v as f32;
        }
        if let Some(v) = &event.name {
            set_field(&mut sh.kevnm, v);
        }
    }

    // Distance and azimuths when both event and station coordinates exist
    if sh.evla != FUNDEF && sh.evlo != FUNDEF && sh.stla != FUNDEF && sh.stlo != FUNDEF {
        let (delta, dist, azimuth, backazimuth) = delaz(
            sh.evla as f64,
            sh.evlo as f64,
            sh.stla as f64,
            sh.stlo as f64,
        );
        sh.az = azimuth as f32;
        sh.baz = backazimuth as f32;
        sh.gcarc = delta as f32;
        sh.dist = dist as f32;
        debug!(
            "inserting variables: AZ: {}, BAZ: {}, GCARC: {}, DIST: {}",
            sh.az, sh.baz, sh.gcarc, sh.dist
        );
    }

    // Reference time at millisecond resolution
    let btime = seg.start_time.to_btime()?;
    sh.nzyear = btime.year as i32;
    sh.nzjday = btime.day as i32;
    sh.nzhour = btime.hour as i32;
    sh.nzmin = btime.min as i32;
    sh.nzsec = btime.sec as i32;
    sh.nzmsec = (btime.fract / 10) as i32;

    // The sub-millisecond portion of the start time lands in the begin and
    // end offsets
    let reference = HpTime::from_time(
        sh.nzyear,
        sh.nzjday as u32,
        sh.nzhour as u32,
        sh.nzmin as u32,
        sh.nzsec as u32,
        sh.nzmsec as u32 * 1000,
    )?;
    let submsec = seg.start_time - reference;
    sh.b = submsec as f32 / HPTMODULUS as f32;
    sh.e = (npts - 1) as f32 * (1.0 / sample_rate) as f32 + submsec as f32 / HPTMODULUS as f32;

    let fdata = seg.samples.to_f32()?;
    Ok((sh, fdata))
}

/// Write a segment as a SAC file in the configured format. Returns the
/// number of samples written.
pub fn write_sac<W: Write>(
    seg: &Segment,
    config: &SacConfig,
    out: &mut W,
) -> Result<usize, MSeedError> {
    let (sh, fdata) = build_header(seg, config)?;
    match config.format {
        SacFormat::Alpha => write_alpha_sac(&sh, &fdata, out)?,
        _ => write_binary_sac(&sh, &fdata, config.format.byte_order(), out)?,
    }
    Ok(fdata.len())
}

/// Write a binary SAC file: the 632-byte header then float32 samples, all
/// in the given byte order.
pub fn write_binary_sac<W: Write>(
    sh: &SacHeader,
    fdata: &[f32],
    order: ByteOrder,
    out: &mut W,
) -> Result<(), MSeedError> {
    out.write_all(&sh.to_bytes(order))?;
    let mut buf = [0u8; 4];
    for v in fdata {
        order.write_f32(&mut buf, *v);
        out.write_all(&buf)?;
    }
    Ok(())
}

/// Write an alphanumeric SAC file: the header block then the samples, 5 per
/// line at `%#15.7g`.
pub fn write_alpha_sac<W: Write>(
    sh: &SacHeader,
    fdata: &[f32],
    out: &mut W,
) -> Result<(), MSeedError> {
    out.write_all(sh.to_alpha().as_bytes())?;
    for chunk in fdata.chunks(5) {
        let mut line = String::new();
        for v in chunk {
            line.push_str(&format_g15(*v as f64));
        }
        line.push('\n');
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

/// Base output file name for a segment:
/// `Net.Sta.Loc.Chan.Qual.Year.Day.HourMinSec`.
pub fn base_output_name(seg: &Segment) -> Result<String, MSeedError> {
    let btime = seg.start_time.to_btime()?;
    Ok(format!(
        "{}.{}.{}.{}.{}.{:04}.{:03}.{:02}{:02}{:02}",
        seg.network,
        seg.station,
        seg.location,
        seg.channel,
        seg.data_quality,
        btime.year,
        btime.day,
        btime.hour,
        btime.min,
        btime.sec
    ))
}

/// Output name with a `-N` disambiguator for N > 0 and the `SACA` suffix
/// for the alpha format.
pub fn output_name(base: &str, index: usize, alpha: bool) -> String {
    let suffix = if alpha { "SACA" } else { "SAC" };
    if index == 0 {
        format!("{}.{}", base, suffix)
    } else {
        format!("{}-{}.{}", base, index, suffix)
    }
}

/// Find an unused output name for the segment, consulting `exists` for up
/// to 1000 candidates. With `overwrite` the first candidate is returned
/// regardless.
pub fn unique_output_name(
    seg: &Segment,
    config: &SacConfig,
    exists: impl Fn(&str) -> bool,
) -> Result<String, MSeedError> {
    let base = base_output_name(seg)?;
    let alpha = config.format.is_alpha();
    if config.overwrite {
        return Ok(output_name(&base, 0, alpha));
    }
    for index in 0..1000 {
        let name = output_name(&base, index, alpha);
        if !exists(&name) {
            return Ok(name);
        }
    }
    Err(MSeedError::OutOfRange(format!(
        "over 1000 files with a base of {}",
        base
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::Samples;

    fn test_segment(count: usize) -> Segment {
        Segment {
            network: String::from("CO"),
            station: String::from("HODGE"),
            location: String::from("00"),
            channel: String::from("LHZ"),
            data_quality: 'D',
            sample_rate: 1.0,
            start_time: HpTime::from_time(2019, 187, 3, 19, 53, 0).unwrap(),
            end_time: HpTime::from_time(2019, 187, 3, 19, 53, 0).unwrap()
                + (count as i64 - 1) * HPTMODULUS,
            sample_count: count as u64,
            samples: Samples::Int32((0..count as i32).collect()),
        }
    }

    #[test]
    fn header_is_632_bytes() {
        let sh = SacHeader::default();
        assert_eq!(sh.to_bytes(ByteOrder::Little).len(), SAC_HEADER_LEN);
        assert_eq!(sh.to_bytes(ByteOrder::Big).len(), SAC_HEADER_LEN);
    }

    #[test]
    fn null_header_sentinels() {
        let sh = SacHeader::default();
        let bytes = sh.to_bytes(ByteOrder::Big);
        // first float is -12345.0
        assert_eq!(ByteOrder::Big.read_f32(&bytes[0..4]), FUNDEF);
        // first int
        let int_base = 4 * NUM_FLOAT_HDR;
        assert_eq!(ByteOrder::Big.read_i32(&bytes[int_base..int_base + 4]), IUNDEF);
        // first string
        let str_base = int_base + 4 * NUM_INT_HDR;
        assert_eq!(&bytes[str_base..str_base + 8], b"-12345  ");
        assert_eq!(&bytes[str_base + 8..str_base + 24], b"-12345          ");
    }

    #[test]
    fn built_header_fields() {
        let seg = test_segment(100);
        let (sh, fdata) = build_header(&seg, &SacConfig::default()).unwrap();
        assert_eq!(sh.npts, 100);
        assert_eq!(sh.delta, 1.0);
        assert_eq!(sh.nvhdr, 6);
        assert_eq!(sh.leven, 1);
        assert_eq!(sh.iftype, ITIME);
        assert_eq!(sh.nzyear, 2019);
        assert_eq!(sh.nzjday, 187);
        assert_eq!(sh.nzhour, 3);
        assert_eq!(sh.nzmsec, 0);
        assert_eq!(sh.b, 0.0);
        assert_eq!(sh.e, 99.0);
        assert_eq!(&sh.kstnm, b"HODGE\0\0\0");
        assert_eq!(&sh.knetwk, b"CO\0\0\0\0\0\0");
        assert_eq!(fdata.len(), 100);
        assert_eq!(fdata[5], 5.0);
    }

    #[test]
    fn binary_output_layout() {
        let seg = test_segment(10);
        let mut config = SacConfig::default();
        config.format = SacFormat::BinaryBigEndian;
        let mut out = Vec::new();
        let n = write_sac(&seg, &config, &mut out).unwrap();
        assert_eq!(n, 10);
        assert_eq!(out.len(), SAC_HEADER_LEN + 4 * 10);
        // delta is the very first float
        assert_eq!(ByteOrder::Big.read_f32(&out[0..4]), 1.0);
        // samples follow the header
        assert_eq!(
            ByteOrder::Big.read_f32(&out[SAC_HEADER_LEN + 4..SAC_HEADER_LEN + 8]),
            1.0
        );

        config.format = SacFormat::BinaryLittleEndian;
        let mut out_le = Vec::new();
        write_sac(&seg, &config, &mut out_le).unwrap();
        assert_eq!(ByteOrder::Little.read_f32(&out_le[0..4]), 1.0);
        // string area is identical regardless of byte order
        let str_base = 4 * (NUM_FLOAT_HDR + NUM_INT_HDR);
        assert_eq!(out[str_base..632], out_le[str_base..632]);
    }

    #[test]
    fn alpha_output_layout() {
        let seg = test_segment(7);
        let mut config = SacConfig::default();
        config.format = SacFormat::Alpha;
        let mut out = Vec::new();
        write_sac(&seg, &config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // 14 float lines, 8 int lines, 8 string lines, 2 data lines
        assert_eq!(lines.len(), 14 + 8 + 8 + 2);
        // five 15-wide floats per full line
        assert_eq!(lines[0].len(), 75);
        assert_eq!(&lines[0][0..15], "       1.000000"); // delta
        // undefined floats render as -12345.00
        assert!(lines[0].contains("-12345.00"));
        // int lines are 10 wide
        assert_eq!(lines[14].len(), 50);
        assert!(lines[14].contains("2019"));
        // first string line is station then 16-char event name
        assert_eq!(lines[22], "HODGE   -12345          ");
        // data lines, 5 then 2 values
        assert_eq!(lines[30].len(), 75);
        assert_eq!(lines[31].len(), 30);
    }

    #[test]
    fn format_g_matches_printf() {
        assert_eq!(format_g15(0.0), "       0.000000");
        assert_eq!(format_g15(1.0), "       1.000000");
        assert_eq!(format_g15(-12345.0), "      -12345.00");
        assert_eq!(format_g15(0.01), "     0.01000000");
        assert_eq!(format_g15(100000000.0), "   1.000000e+08");
        assert_eq!(format_g15(0.000015), "   1.500000e-05");
        assert_eq!(format_g15(9999999.5), "   1.000000e+07");
    }

    #[test]
    fn delaz_equator_quarter_circle() {
        // both points on the equator, 90 degrees of longitude apart: the
        // geocentric correction vanishes and everything is exact
        let (delta, dist, az, baz) = delaz(0.0, 90.0, 0.0, 0.0);
        assert!((delta - 90.0).abs() < 1e-9);
        assert!((dist - 90.0 * 111.19).abs() < 1e-6);
        assert!((az - 270.0).abs() < 1e-9);
        assert!((baz - 90.0).abs() < 1e-9);
    }

    #[test]
    fn delaz_tonga_consistency() {
        let (delta, dist, az, baz) = delaz(-20.33, -174.03, 0.0, 0.0);
        assert!((dist - delta * 111.19).abs() < 1e-4);
        assert!((0.0..360.0).contains(&az));
        assert!((0.0..360.0).contains(&baz));
        assert!(delta > 0.0 && delta < 180.0);
        // sanity: roughly between Tonga and the Gulf of Guinea
        assert!(delta > 150.0);
    }

    #[test]
    fn event_offset_and_delaz_inserted() {
        let seg = test_segment(10);
        let mut config = SacConfig::default();
        config.station_latitude = Some(0.0);
        config.station_longitude = Some(0.0);
        config.event = Some(SacEvent {
            time: Some(seg.start_time + (-30) * HPTMODULUS),
            latitude: Some(-20.33),
            longitude: Some(-174.03),
            depth: Some(65.5),
            name: Some(String::from("Tonga")),
        });
        let (sh, _) = build_header(&seg, &config).unwrap();
        assert_eq!(sh.o, -30.0);
        assert_eq!(sh.evdp, 65.5);
        assert_eq!(&sh.kevnm[0..5], b"Tonga");
        assert_ne!(sh.gcarc, FUNDEF);
        assert_ne!(sh.az, FUNDEF);
        assert!((sh.dist - sh.gcarc * 111.19).abs() < 0.01);
    }

    #[test]
    fn output_names() {
        let seg = test_segment(10);
        let base = base_output_name(&seg).unwrap();
        assert_eq!(base, "CO.HODGE.00.LHZ.D.2019.187.031953");
        assert_eq!(output_name(&base, 0, false), "CO.HODGE.00.LHZ.D.2019.187.031953.SAC");
        assert_eq!(
            output_name(&base, 2, true),
            "CO.HODGE.00.LHZ.D.2019.187.031953-2.SACA"
        );

        // first candidate taken, -1 disambiguator when it exists
        let config = SacConfig::default();
        let first = output_name(&base, 0, false);
        let name = unique_output_name(&seg, &config, |_| false).unwrap();
        assert_eq!(name, first);
        let name = unique_output_name(&seg, &config, |n| n == first).unwrap();
        assert_eq!(name, output_name(&base, 1, false));

        // overwrite always reuses the first candidate
        let overwrite = SacConfig {
            overwrite: true,
            ..SacConfig::default()
        };
        let name = unique_output_name(&seg, &overwrite, |_| true).unwrap();
        assert_eq!(name, first);
    }
}
