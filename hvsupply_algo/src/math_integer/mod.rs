pub mod crc16;
pub mod crc8;
