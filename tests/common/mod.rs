#![allow(dead_code)]

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rppg_ptt::Config;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.processor.threads = 2;
    config
}

pub fn noise(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

pub fn random_mask(h: usize, w: usize, p_inside: f64, seed: u64) -> Array2<bool> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((h, w), |_| rng.gen_bool(p_inside))
}

pub fn random_volume(h: usize, w: usize, n: usize, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((h, w, n), |_| rng.gen_range(-1.0..1.0))
}
