//! The mtcars dataset: 32 cars, fuel consumption and ten design and
//! performance predictors.

use crate::data::Data;

pub const N_ROW: usize = 32;
pub const N_COL: usize = 10;

// cyl, disp, hp, drat, wt, qsec, vs, am, gear, carb.
#[rustfmt::skip]
static ROWS: [f64; 320] = [
    6.0, 160.0, 110.0, 3.90, 2.620, 16.46, 0.0, 1.0, 4.0, 4.0,
    6.0, 160.0, 110.0, 3.90, 2.875, 17.02, 0.0, 1.0, 4.0, 4.0,
    4.0, 108.0,  93.0, 3.85, 2.320, 18.61, 1.0, 1.0, 4.0, 1.0,
    6.0, 258.0, 110.0, 3.08, 3.215, 19.44, 1.0, 0.0, 3.0, 1.0,
    8.0, 360.0, 175.0, 3.15, 3.440, 17.02, 0.0, 0.0, 3.0, 2.0,
    6.0, 225.0, 105.0, 2.76, 3.460, 20.22, 1.0, 0.0, 3.0, 1.0,
    8.0, 360.0, 245.0, 3.21, 3.570, 15.84, 0.0, 0.0, 3.0, 4.0,
    4.0, 146.7,  62.0, 3.69, 3.190, 20.00, 1.0, 0.0, 4.0, 2.0,
    4.0, 140.8,  95.0, 3.92, 3.150, 22.90, 1.0, 0.0, 4.0, 2.0,
    6.0, 167.6, 123.0, 3.92, 3.440, 18.30, 1.0, 0.0, 4.0, 4.0,
    6.0, 167.6, 123.0, 3.92, 3.440, 18.90, 1.0, 0.0, 4.0, 4.0,
    8.0, 275.8, 180.0, 3.07, 4.070, 17.40, 0.0, 0.0, 3.0, 3.0,
    8.0, 275.8, 180.0, 3.07, 3.730, 17.60, 0.0, 0.0, 3.0, 3.0,
    8.0, 275.8, 180.0, 3.07, 3.780, 18.00, 0.0, 0.0, 3.0, 3.0,
    8.0, 472.0, 205.0, 2.93, 5.250, 17.98, 0.0, 0.0, 3.0, 4.0,
    8.0, 460.0, 215.0, 3.00, 5.424, 17.82, 0.0, 0.0, 3.0, 4.0,
    8.0, 440.0, 230.0, 3.23, 5.345, 17.42, 0.0, 0.0, 3.0, 4.0,
    4.0,  78.7,  66.0, 4.08, 2.200, 19.47, 1.0, 1.0, 4.0, 1.0,
    4.0,  75.7,  52.0, 4.93, 1.615, 18.52, 1.0, 1.0, 4.0, 2.0,
    4.0,  71.1,  65.0, 4.22, 1.835, 19.90, 1.0, 1.0, 4.0, 1.0,
    4.0, 120.1,  97.0, 3.70, 2.465, 20.01, 1.0, 0.0, 3.0, 1.0,
    8.0, 318.0, 150.0, 2.76, 3.520, 16.87, 0.0, 0.0, 3.0, 2.0,
    8.0, 304.0, 150.0, 3.15, 3.435, 17.30, 0.0, 0.0, 3.0, 2.0,
    8.0, 350.0, 245.0, 3.73, 3.840, 15.41, 0.0, 0.0, 3.0, 4.0,
    8.0, 400.0, 175.0, 3.08, 3.845, 17.05, 0.0, 0.0, 3.0, 2.0,
    4.0,  79.0,  66.0, 4.08, 1.935, 18.90, 1.0, 1.0, 4.0, 1.0,
    4.0, 120.3,  91.0, 4.43, 2.140, 16.70, 0.0, 1.0, 5.0, 2.0,
    4.0,  95.1, 113.0, 3.77, 1.513, 16.90, 1.0, 1.0, 5.0, 2.0,
    8.0, 351.0, 264.0, 4.22, 3.170, 14.50, 0.0, 1.0, 5.0, 4.0,
    6.0, 145.0, 175.0, 3.62, 2.770, 15.50, 0.0, 1.0, 5.0, 6.0,
    8.0, 301.0, 335.0, 3.54, 3.570, 14.60, 0.0, 1.0, 5.0, 8.0,
    4.0, 121.0, 109.0, 4.11, 1.780, 18.60, 1.0, 1.0, 4.0, 2.0,
];

#[rustfmt::skip]
static MPG: [f64; 32] = [
    21.0, 21.0, 22.8, 21.4, 18.7, 18.1, 14.3, 24.4, 22.8, 19.2, 17.8,
    16.4, 17.3, 15.2, 10.4, 10.4, 14.7, 32.4, 30.4, 33.9, 21.5, 15.5,
    15.2, 13.3, 19.2, 27.3, 26.0, 30.4, 15.8, 19.7, 15.0, 21.4,
];

pub fn rows() -> &'static [f64] {
    &ROWS
}

pub fn response() -> &'static [f64] {
    &MPG
}

pub fn predictor_names() -> Vec<String> {
    ["cyl", "disp", "hp", "drat", "wt", "qsec", "vs", "am", "gear", "carb"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Regression layout: the ten predictors explain fuel consumption.
pub fn load_data() -> Data {
    Data::dense_rows(&ROWS, N_ROW, N_COL, MPG.to_vec()).unwrap()
}
