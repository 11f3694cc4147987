use super::CameraPins;

pub const CAMERA_PINS: CameraPins = CameraPins {
    pwdn: -1,
    reset: -1,
    xclk: 4,
    sda: 18,
    scl: 23,
    d: [34, 13, 14, 35, 39, 38, 37, 36],
    vsync: 5,
    href: 27,
    pclk: 25,
};
