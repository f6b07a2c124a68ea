pub mod range;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

pub use self::range::Range;

pub fn read_file_to_box<P: AsRef<Path>>(filepath: P) -> io::Result<Box<[u8]>> {
    let mut file = File::open(filepath)?;
    let mut file_buffer = Vec::new();

    file.read_to_end(&mut file_buffer)?;

    Ok(file_buffer.into_boxed_slice())
}

pub fn discard<R: Read>(reader: &mut R, size: usize) -> io::Result<()> {
    let mut buffer = vec![0; size];
    reader.read_exact(&mut buffer)?;

    Ok(())
}

pub fn read_to_buffer<R: Read>(reader: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    reader.read_exact(&mut buffer)?;

    Ok(buffer)
}

pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    Ok(LittleEndian::read_u32(&read_to_buffer(reader, 4)?))
}
