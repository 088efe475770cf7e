//! Ground-truth label files.
//!
//! One record per line: `image_path,x1,y1,x2,y2,label`, corners in pixels.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use tracing::{debug, info};

use crate::bbox::{BBox, ImageSize};
use crate::error::{AnchorError, Result};

const FIELDS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub image_path: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub label: String,
}

impl LabelRecord {
    /// Image-relative, origin-centered box for clustering.
    pub fn to_ground_truth(&self, image: ImageSize) -> BBox {
        BBox::from_corners(self.x1, self.y1, self.x2, self.y2)
            .scale_rel(image)
            .at_origin()
    }
}

/// Parse one record. `line_no` is 1-based and only used for error reporting.
pub fn parse_line(line: &str, line_no: usize) -> Result<LabelRecord> {
    let fields: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
    if fields.len() != FIELDS {
        return Err(AnchorError::malformed(
            line_no,
            format!("expected {} fields (image_path,x1,y1,x2,y2,label), got {}", FIELDS, fields.len()),
        ));
    }

    let coord = |idx: usize, name: &str| -> Result<f64> {
        let raw = fields[idx];
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(AnchorError::malformed(line_no, format!("{} is not a number: '{}'", name, raw))),
        }
    };

    let rec = LabelRecord {
        image_path: fields[0].to_string(),
        x1: coord(1, "x1")?,
        y1: coord(2, "y1")?,
        x2: coord(3, "x2")?,
        y2: coord(4, "y2")?,
        label: fields[5].to_string(),
    };

    if rec.x2 <= rec.x1 || rec.y2 <= rec.y1 {
        return Err(AnchorError::malformed(
            line_no,
            format!("empty box ({},{})-({},{})", rec.x1, rec.y1, rec.x2, rec.y2),
        ));
    }
    Ok(rec)
}

/// Read every record from `reader`, skipping blank lines.
pub fn read_ground_truth<R: BufRead>(reader: R, image: ImageSize) -> Result<Vec<BBox>> {
    read_records(reader, image, Path::new("<input>"))
}

pub fn load_ground_truth(path: impl AsRef<Path>, image: ImageSize) -> Result<Vec<BBox>> {
    let path = path.as_ref();
    debug!("labels: reading {}", path.display());
    let file = File::open(path).map_err(|source| AnchorError::Io { path: path.to_path_buf(), source })?;
    let boxes = read_records(BufReader::new(file), image, path)?;
    info!("labels: {} boxes from {}", boxes.len(), path.display());
    Ok(boxes)
}

/// Undecodable text is a bad record; any other read failure is an I/O error on `path`.
fn read_records<R: BufRead>(reader: R, image: ImageSize, path: &Path) -> Result<Vec<BBox>> {
    let mut boxes = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| match e.kind() {
            ErrorKind::InvalidData => AnchorError::malformed(line_no, format!("unreadable line: {}", e)),
            _ => AnchorError::Io { path: path.to_path_buf(), source: e },
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let rec = parse_line(&line, line_no)?;
        boxes.push(rec.to_ground_truth(image));
    }
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn img() -> ImageSize {
        ImageSize::new(1280, 960).unwrap()
    }

    #[test]
    fn parses_record() {
        let rec = parse_line("img.jpg,10,20,110,220,cat", 1).unwrap();
        assert_eq!(rec.image_path, "img.jpg");
        assert_eq!(rec.label, "cat");
        assert_eq!((rec.x1, rec.y1, rec.x2, rec.y2), (10.0, 20.0, 110.0, 220.0));
    }

    #[test]
    fn record_to_relative_box() {
        let b = parse_line("img.jpg,10,20,110,220,cat", 1).unwrap().to_ground_truth(img());
        assert_relative_eq!(b.w, 100.0 / 1280.0);
        assert_relative_eq!(b.h, 200.0 / 960.0);
        assert_eq!((b.cx, b.cy), (0.0, 0.0));
    }

    #[test]
    fn tolerates_whitespace_and_crlf() {
        let rec = parse_line(" a.png , 0, 0 ,64,32 , dog\r\n", 1).unwrap();
        assert_eq!(rec.image_path, "a.png");
        assert_eq!(rec.x2, 64.0);
        assert_eq!(rec.label, "dog");
    }

    #[rstest]
    #[case("img.jpg,10,20,110,220")]
    #[case("img.jpg,10,20,110,220,cat,extra")]
    #[case("img.jpg,ten,20,110,220,cat")]
    #[case("img.jpg,10,20,inf,220,cat")]
    #[case("img.jpg,110,20,10,220,cat")]
    #[case("img.jpg,10,20,10,220,cat")]
    fn malformed_records(#[case] line: &str) {
        let err = parse_line(line, 7).unwrap_err();
        assert!(matches!(err, AnchorError::MalformedRecord { line: 7, .. }), "{err}");
    }

    #[test]
    fn reader_skips_blank_lines_and_reports_line_numbers() {
        let data = "a.jpg,0,0,128,96,x\n\nb.jpg,0,0,640,480,y\n";
        let boxes = read_ground_truth(data.as_bytes(), img()).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_relative_eq!(boxes[1].w, 0.5);
        assert_relative_eq!(boxes[1].h, 0.5);

        let err = read_ground_truth("a.jpg,0,0,128,96,x\nbroken\n".as_bytes(), img()).unwrap_err();
        assert!(matches!(err, AnchorError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn invalid_utf8_is_malformed_record() {
        let data: &[u8] = b"a.jpg,0,0,128,96,x\nb.jpg,0,0,\xff\xfe,96,y\n";
        let err = read_ground_truth(data, img()).unwrap_err();
        assert!(matches!(err, AnchorError::MalformedRecord { line: 2, .. }), "{err}");
    }

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn read_failure_is_io_error() {
        let err = read_ground_truth(BufReader::new(FailingReader), img()).unwrap_err();
        assert!(matches!(err, AnchorError::Io { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn read_failure_keeps_file_path() {
        // opening a directory succeeds on unix, reading it does not
        let dir = tempfile::tempdir().unwrap();
        match load_ground_truth(dir.path(), img()) {
            Err(AnchorError::Io { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_ground_truth("/definitely/not/here.txt", img()).unwrap_err();
        assert!(matches!(err, AnchorError::Io { .. }));
    }
}
