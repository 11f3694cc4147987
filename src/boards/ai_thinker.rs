use super::CameraPins;

pub const CAMERA_PINS: CameraPins = CameraPins {
    pwdn: 32,
    reset: -1,
    xclk: 0,
    sda: 26,
    scl: 27,
    d: [5, 18, 19, 21, 36, 39, 34, 35],
    vsync: 25,
    href: 23,
    pclk: 22,
};
