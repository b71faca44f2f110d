//! SIMD reductions used by the gradient engine.
//!
//! Three operations on contiguous f64 buffers: accumulate, normalize, dot.
//! Each dispatches once per process to a 256-bit AVX2 body when the CPU
//! supports it and otherwise runs the scalar loop. Both paths agree to
//! within the reassociation permitted inside a SIMD lane.

use std::sync::OnceLock;

static AVX2_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Whether the wide-vector path is active. Resolved once per process.
#[inline]
pub fn wide_lanes_available() -> bool {
    *AVX2_AVAILABLE.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            std::arch::is_x86_feature_detected!("avx2")
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    })
}

/// `out[i] += scale * in[i]`.
pub fn accumulate(out: &mut [f64], input: &[f64], scale: f64) {
    debug_assert_eq!(out.len(), input.len());
    #[cfg(target_arch = "x86_64")]
    if wide_lanes_available() {
        // Safety: AVX2 support was verified by the dispatch latch.
        unsafe { accumulate_avx2(out, input, scale) };
        return;
    }
    accumulate_scalar(out, input, scale);
}

/// `out[i] = in[i] / sigma2`.
pub fn normalize(out: &mut [f64], input: &[f64], sigma2: f64) {
    debug_assert_eq!(out.len(), input.len());
    #[cfg(target_arch = "x86_64")]
    if wide_lanes_available() {
        // Safety: AVX2 support was verified by the dispatch latch.
        unsafe { normalize_avx2(out, input, sigma2) };
        return;
    }
    normalize_scalar(out, input, sigma2);
}

/// `sum(a[i] * b[i])`.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(target_arch = "x86_64")]
    if wide_lanes_available() {
        // Safety: AVX2 support was verified by the dispatch latch.
        return unsafe { dot_avx2(a, b) };
    }
    dot_scalar(a, b)
}

fn accumulate_scalar(out: &mut [f64], input: &[f64], scale: f64) {
    for (o, i) in out.iter_mut().zip(input.iter()) {
        *o += scale * i;
    }
}

fn normalize_scalar(out: &mut [f64], input: &[f64], sigma2: f64) {
    for (o, i) in out.iter_mut().zip(input.iter()) {
        *o = i / sigma2;
    }
}

fn dot_scalar(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn accumulate_avx2(out: &mut [f64], input: &[f64], scale: f64) {
    use std::arch::x86_64::*;

    let n = out.len();
    let chunks = n / 4;
    let scale_v = _mm256_set1_pd(scale);

    for c in 0..chunks {
        let idx = c * 4;
        let o = _mm256_loadu_pd(out.as_ptr().add(idx));
        let i = _mm256_loadu_pd(input.as_ptr().add(idx));
        let r = _mm256_add_pd(o, _mm256_mul_pd(scale_v, i));
        _mm256_storeu_pd(out.as_mut_ptr().add(idx), r);
    }

    for idx in (chunks * 4)..n {
        out[idx] += scale * input[idx];
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn normalize_avx2(out: &mut [f64], input: &[f64], sigma2: f64) {
    use std::arch::x86_64::*;

    let n = out.len();
    let chunks = n / 4;
    let sigma_v = _mm256_set1_pd(sigma2);

    for c in 0..chunks {
        let idx = c * 4;
        let i = _mm256_loadu_pd(input.as_ptr().add(idx));
        _mm256_storeu_pd(out.as_mut_ptr().add(idx), _mm256_div_pd(i, sigma_v));
    }

    for idx in (chunks * 4)..n {
        out[idx] = input[idx] / sigma2;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dot_avx2(a: &[f64], b: &[f64]) -> f64 {
    use std::arch::x86_64::*;

    let n = a.len();
    let chunks = n / 4;
    let mut acc = _mm256_setzero_pd();

    for c in 0..chunks {
        let idx = c * 4;
        let av = _mm256_loadu_pd(a.as_ptr().add(idx));
        let bv = _mm256_loadu_pd(b.as_ptr().add(idx));
        acc = _mm256_add_pd(acc, _mm256_mul_pd(av, bv));
    }

    let mut lanes = [0.0f64; 4];
    _mm256_storeu_pd(lanes.as_mut_ptr(), acc);
    let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];

    for idx in (chunks * 4)..n {
        sum += a[idx] * b[idx];
    }
    sum
}
