//! Synthetic MLV recordings for tests
//!
//! Only depends on std so it can be compiled both into the library's unit tests and the
//! integration tests.

#![allow(dead_code)]

use std::path::Path;

pub const GUID: u64 = 0x0123_4567_89ab_cdef;
pub const CAMERA_NAME: &str = "Canon EOS 5D Mark III";
pub const CAMERA_MODEL: u32 = 0x8000_0285;
pub const BLACK_LEVEL: i32 = 2048;
pub const WHITE_LEVEL: i32 = 15000;

const D65_MATRIX: [i32; 9] = [6722, -635, -963, -4287, 12460, 2028, -908, 2162, 5668];

/// Packs row-major samples the way the camera does: an MSB-first bit stream stored in
/// little-endian 16-bit words.
pub fn pack_samples(samples: &[u16], bits: u32) -> Vec<u8> {
    if bits == 8 {
        return samples.iter().map(|&v| v as u8).collect();
    }
    if bits == 16 {
        return samples.iter().flat_map(|v| v.to_le_bytes()).collect();
    }
    let mut out = Vec::with_capacity(samples.len() * bits as usize / 8);
    let mut acc: u64 = 0;
    let mut filled = 0u32;
    for &v in samples {
        acc = (acc << bits) | (v as u64 & ((1 << bits) - 1));
        filled += bits;
        while filled >= 16 {
            let word = (acc >> (filled - 16)) as u16;
            out.extend_from_slice(&word.to_le_bytes());
            filled -= 16;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct MlvBuilder {
    width: u16,
    height: u16,
    bits: u32,
    guid: u64,
    file_num: u16,
    file_count: u16,
    flags: u32,
    video_class: u16,
    fps: (u32, u32),
    frame_space: u32,
    metadata: bool,
    ident: bool,
    body: Vec<u8>,
    timestamp: u64,
}

impl MlvBuilder {
    pub fn new(width: u16, height: u16, bits: u32) -> Self {
        Self {
            width,
            height,
            bits,
            guid: GUID,
            file_num: 0,
            file_count: 1,
            flags: 0,
            video_class: 1,
            fps: (25000, 1000),
            frame_space: 0,
            metadata: true,
            ident: true,
            body: Vec::new(),
            timestamp: 1000,
        }
    }

    /// A continuation file (`.M00` = `file_num` 1) carrying only the file header and frames.
    pub fn continuation(&self, file_num: u16) -> Self {
        Self {
            file_num,
            metadata: false,
            body: Vec::new(),
            ..self.clone()
        }
    }

    pub fn guid(&mut self, guid: u64) -> &mut Self {
        self.guid = guid;
        self
    }

    pub fn file_count(&mut self, count: u16) -> &mut Self {
        self.file_count = count;
        self
    }

    pub fn flags(&mut self, flags: u32) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn video_class(&mut self, class: u16) -> &mut Self {
        self.video_class = class;
        self
    }

    pub fn fps(&mut self, nom: u32, denom: u32) -> &mut Self {
        self.fps = (nom, denom);
        self
    }

    pub fn frame_space(&mut self, space: u32) -> &mut Self {
        self.frame_space = space;
        self
    }

    pub fn without_ident(&mut self) -> &mut Self {
        self.ident = false;
        self
    }

    fn next_timestamp(&mut self) -> u64 {
        self.timestamp += 40_000;
        self.timestamp
    }

    fn chunk(&mut self, tag: [u8; 4], payload: &[u8]) {
        let timestamp = self.next_timestamp();
        self.body.extend_from_slice(&tag);
        self.body
            .extend_from_slice(&(16 + payload.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&timestamp.to_le_bytes());
        self.body.extend_from_slice(payload);
    }

    /// Appends an arbitrary chunk with a 16-byte header.
    pub fn raw_chunk(&mut self, tag: [u8; 4], payload: &[u8]) -> &mut Self {
        self.chunk(tag, payload);
        self
    }

    /// Appends a frame with every sample set to `value`.
    pub fn video_frame(&mut self, frame_number: u32, value: u16) -> &mut Self {
        let samples = vec![value; self.width as usize * self.height as usize];
        self.video_frame_samples(frame_number, &samples)
    }

    pub fn video_frame_samples(&mut self, frame_number: u32, samples: &[u16]) -> &mut Self {
        let data = pack_samples(samples, self.bits);
        self.video_frame_payload(frame_number, &data)
    }

    /// Appends a frame with an arbitrary payload, e.g. a compressed one.
    pub fn video_frame_payload(&mut self, frame_number: u32, data: &[u8]) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&frame_number.to_le_bytes());
        payload.extend_from_slice(&[0u8; 8]);
        payload.extend_from_slice(&self.frame_space.to_le_bytes());
        payload.extend(std::iter::repeat_n(0xEEu8, self.frame_space as usize));
        payload.extend_from_slice(data);
        self.chunk(*b"VIDF", &payload);
        self
    }

    pub fn audio_frame(&mut self, frame_number: u32, len: usize) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&frame_number.to_le_bytes());
        payload.extend_from_slice(&self.frame_space.to_le_bytes());
        payload.extend(std::iter::repeat_n(0xEEu8, self.frame_space as usize));
        payload.extend((0..len).map(|i| i as u8));
        self.chunk(*b"AUDF", &payload);
        self
    }

    fn file_header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(52);
        out.extend_from_slice(b"MLVI");
        out.extend_from_slice(&52u32.to_le_bytes());
        out.extend_from_slice(b"v2.0\0\0\0\0");
        out.extend_from_slice(&self.guid.to_le_bytes());
        out.extend_from_slice(&self.file_num.to_le_bytes());
        out.extend_from_slice(&self.file_count.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.video_class.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.fps.0.to_le_bytes());
        out.extend_from_slice(&self.fps.1.to_le_bytes());
        out
    }

    fn raw_info_payload(&self) -> Vec<u8> {
        let (w, h) = (self.width as i32, self.height as i32);
        let pitch = w * self.bits as i32 / 8;
        let mut p = Vec::new();
        p.extend_from_slice(&self.width.to_le_bytes());
        p.extend_from_slice(&self.height.to_le_bytes());
        let mut fields = vec![
            1,
            0,
            h,
            w,
            pitch,
            pitch * h,
            self.bits as i32,
            BLACK_LEVEL,
            WHITE_LEVEL,
            0,
            0,
            w,
            h,
            0,
            0,
            h,
            w,
            0,
            0,
            0x0201_0100,
            21,
        ];
        for v in D65_MATRIX {
            fields.push(v);
            fields.push(10000);
        }
        fields.push(1100);
        for v in fields {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p
    }

    fn metadata_chunks(&mut self) {
        let rawi = self.raw_info_payload();
        self.chunk(*b"RAWI", &rawi);

        if self.ident {
            let mut idnt = fixed(CAMERA_NAME, 32);
            idnt.extend_from_slice(&CAMERA_MODEL.to_le_bytes());
            idnt.extend_from_slice(&fixed("123456789", 32));
            self.chunk(*b"IDNT", &idnt);
        }

        let mut expo = Vec::new();
        for v in [0u32, 800, 800, 0] {
            expo.extend_from_slice(&v.to_le_bytes());
        }
        expo.extend_from_slice(&20_000u64.to_le_bytes());
        self.chunk(*b"EXPO", &expo);

        let mut lens = Vec::new();
        for v in [35u16, 3000, 280] {
            lens.extend_from_slice(&v.to_le_bytes());
        }
        lens.extend_from_slice(&[1, 0]);
        lens.extend_from_slice(&0u32.to_le_bytes());
        lens.extend_from_slice(&0x4aa1u32.to_le_bytes());
        lens.extend_from_slice(&fixed("EF24-70mm f/2.8L II USM", 32));
        lens.extend_from_slice(&fixed("", 32));
        self.chunk(*b"LENS", &lens);

        let mut wbal = Vec::new();
        for v in [0u32, 5500, 2048, 1024, 1600, 0, 0] {
            wbal.extend_from_slice(&v.to_le_bytes());
        }
        self.chunk(*b"WBAL", &wbal);

        let mut rtci = Vec::new();
        for v in [30u16, 15, 9, 24, 11, 117, 0, 357, 0, 0] {
            rtci.extend_from_slice(&v.to_le_bytes());
        }
        rtci.extend_from_slice(&fixed("CET", 8));
        self.chunk(*b"RTCI", &rtci);

        let mut wavi = Vec::new();
        wavi.extend_from_slice(&1u16.to_le_bytes());
        wavi.extend_from_slice(&2u16.to_le_bytes());
        wavi.extend_from_slice(&48_000u32.to_le_bytes());
        wavi.extend_from_slice(&192_000u32.to_le_bytes());
        wavi.extend_from_slice(&4u16.to_le_bytes());
        wavi.extend_from_slice(&16u16.to_le_bytes());
        self.chunk(*b"WAVI", &wavi);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut file = self.clone();
        file.body.clear();
        if file.metadata {
            file.metadata_chunks();
        }
        let mut out = self.file_header();
        out.extend_from_slice(&file.body);
        out.extend_from_slice(&self.body);
        out
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }
}

fn fixed(s: &str, len: usize) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.resize(len, 0);
    out
}
