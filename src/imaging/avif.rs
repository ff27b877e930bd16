//! AVIF source decoding.
//!
//! The `image` crate's `avif` feature only encodes. Sources are unpacked with
//! `avif-parse` and the AV1 payload is decoded with `rav1d`, then converted
//! from full-range BT.601 YUV to RGB8. Alpha planes are not read.

use super::backend::BackendError;
use image::{Rgb, RgbImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as api;
use std::io::Cursor;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

fn decoder_error(step: &str, code: i32) -> BackendError {
    BackendError::ProcessingFailed(format!("rav1d {step} failed ({code})"))
}

/// Decode the primary item of an AVIF file into an RGB image.
pub(crate) fn decode_avif(bytes: &[u8]) -> Result<RgbImage, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::ProcessingFailed(format!("failed to parse AVIF: {e:?}")))?;
    let payload: &[u8] = &avif.primary_item;

    let mut settings = MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| BackendError::ProcessingFailed("rav1d settings unavailable".into()))?;
    // SAFETY: dav1d_default_settings writes every field before we read it.
    let mut settings = unsafe {
        api::dav1d_default_settings(settings_ptr);
        settings.assume_init()
    };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { api::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(decoder_error("open", rc.0));
    }

    // Every exit below goes through the single dav1d_close after the block.
    let decoded = (|| -> Result<RgbImage, BackendError> {
        let mut data = Dav1dData::default();
        let buf = unsafe { api::dav1d_data_create(NonNull::new(&mut data), payload.len()) };
        if buf.is_null() {
            return Err(BackendError::ProcessingFailed(
                "rav1d data_create failed".into(),
            ));
        }
        // SAFETY: buf was just allocated with payload.len() bytes.
        unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len()) };

        let rc = unsafe { api::dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { api::dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(decoder_error("send_data", rc.0));
        }

        let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { api::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
        if rc.0 != 0 {
            return Err(decoder_error("get_picture", rc.0));
        }
        let rgb = picture_to_rgb(&pic);
        unsafe { api::dav1d_picture_unref(NonNull::new(&mut pic)) };
        rgb
    })();

    unsafe { api::dav1d_close(NonNull::new(&mut ctx)) };
    decoded
}

/// One sample plane of a decoded picture.
struct Plane {
    ptr: *const u8,
    stride: isize,
    high_depth: bool,
}

impl Plane {
    /// # Safety
    ///
    /// `(x, y)` must lie inside the plane the pointer was taken from.
    unsafe fn sample(&self, x: u32, y: u32) -> f32 {
        let row = y as isize * self.stride;
        unsafe {
            if self.high_depth {
                // 10 and 12 bit samples are stored as u16
                *(self.ptr.offset(row + x as isize * 2) as *const u16) as f32
            } else {
                *self.ptr.offset(row + x as isize) as f32
            }
        }
    }
}

struct Chroma {
    u: Plane,
    v: Plane,
    subsample_x: bool,
    subsample_y: bool,
}

fn picture_to_rgb(pic: &Dav1dPicture) -> Result<RgbImage, BackendError> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    if width == 0 || height == 0 || !(8..=16).contains(&bpc) {
        return Err(BackendError::ProcessingFailed(format!(
            "AVIF decoded to an invalid picture ({width}x{height}, {bpc} bit)"
        )));
    }

    let plane = |index: usize, stride: isize| -> Result<Plane, BackendError> {
        let ptr = pic.data[index].ok_or_else(|| {
            BackendError::ProcessingFailed(format!("AVIF picture has no plane {index}"))
        })?;
        Ok(Plane {
            ptr: ptr.as_ptr() as *const u8,
            stride,
            high_depth: bpc > 8,
        })
    };

    let luma = plane(0, pic.stride[0])?;
    let subsampling = match pic.p.layout {
        DAV1D_PIXEL_LAYOUT_I400 => None,
        DAV1D_PIXEL_LAYOUT_I420 => Some((true, true)),
        DAV1D_PIXEL_LAYOUT_I422 => Some((true, false)),
        DAV1D_PIXEL_LAYOUT_I444 => Some((false, false)),
        other => {
            return Err(BackendError::Unsupported(format!(
                "AVIF pixel layout {other}"
            )));
        }
    };
    let chroma = match subsampling {
        Some((subsample_x, subsample_y)) => Some(Chroma {
            u: plane(1, pic.stride[1])?,
            v: plane(2, pic.stride[1])?,
            subsample_x,
            subsample_y,
        }),
        None => None,
    };

    let max = ((1u32 << bpc) - 1) as f32;
    let center = (1u32 << (bpc - 1)) as f32;
    let scale = 255.0 / max;
    let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

    // SAFETY: x < width and y < height of the decoded picture, and chroma
    // coordinates are divided down by the plane's subsampling.
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let luma_value = unsafe { luma.sample(x, y) };
        let Some(chroma) = &chroma else {
            let v = to_u8(luma_value);
            return Rgb([v, v, v]);
        };
        let cx = if chroma.subsample_x { x / 2 } else { x };
        let cy = if chroma.subsample_y { y / 2 } else { y };
        let cb = unsafe { chroma.u.sample(cx, cy) } - center;
        let cr = unsafe { chroma.v.sample(cx, cy) } - center;
        Rgb([
            to_u8(luma_value + 1.402 * cr),
            to_u8(luma_value - 0.344_136 * cb - 0.714_136 * cr),
            to_u8(luma_value + 1.772 * cb),
        ])
    }))
}
