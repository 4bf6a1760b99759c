/// PalmDOC LZ77 decompression
///
/// The compression scheme is simple:
/// - Bytes 0x01-0x08: Copy next 'n' bytes literally
/// - Bytes 0x00, 0x09-0x7F: Literal character
/// - Bytes 0x80-0xBF: Back-reference (LZ77)
///   - Combined with next byte: distance = (val & 0x3FFF) >> 3, length = (val & 7) + 3
/// - Bytes 0xC0-0xFF: Space + (byte ^ 0x80)
///
/// Back-references that point before the start of the output are dropped.
pub fn decompress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 2);
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        i += 1;

        match c {
            0x01..=0x08 => {
                let end = (i + c as usize).min(input.len());
                output.extend_from_slice(&input[i..end]);
                i = end;
            }
            0x00 | 0x09..=0x7F => output.push(c),
            0xC0..=0xFF => {
                output.push(b' ');
                output.push(c ^ 0x80);
            }
            _ => {
                let Some(&next) = input.get(i) else {
                    break;
                };
                i += 1;
                let combined = u16::from_be_bytes([c, next]);
                let distance = ((combined & 0x3FFF) >> 3) as usize;
                let length = ((combined & 7) + 3) as usize;
                if distance == 0 || distance > output.len() {
                    continue;
                }
                // byte by byte: the source may overlap the bytes being written
                for _ in 0..length {
                    output.push(output[output.len() - distance]);
                }
            }
        }
    }

    output
}
