use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek},
};

/// Read-only, seekable byte source feeding one elementary-stream reader.
pub trait ByteStream: Read + Seek {
    /// True while more data is expected (e.g. the next adaptive segment is
    /// still downloading). An exhausted read is then not treated as EOS.
    fn waiting_for_segment(&self) -> bool {
        false
    }
}

impl<T: AsRef<[u8]>> ByteStream for Cursor<T> {}

impl ByteStream for File {}

impl<R: Read + Seek> ByteStream for BufReader<R> {}

impl<S: ByteStream + ?Sized> ByteStream for &mut S {
    fn waiting_for_segment(&self) -> bool {
        (**self).waiting_for_segment()
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn waiting_for_segment(&self) -> bool {
        (**self).waiting_for_segment()
    }
}

/// Reads until `buf` is full or the stream is exhausted.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_up_to_stops_at_end_of_stream() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_up_to(&mut cursor, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(read_up_to(&mut cursor, &mut buf).unwrap(), 0);
    }

    #[test]
    fn cursors_are_never_waiting() {
        let cursor = Cursor::new(Vec::<u8>::new());
        assert!(!cursor.waiting_for_segment());
    }
}
