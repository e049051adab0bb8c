use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

pub fn pkg_info(name: &str, version: &str) -> String {
    format!(
        "Metadata-Version: 2.1\nName: {name}\nVersion: {version}\nSummary: Test package\nAuthor: Someone\n\nLong description.\n"
    )
}

/// A gzipped source distribution with `{name}-{version}/PKG-INFO`.
pub fn sdist(name: &str, version: &str) -> Vec<u8> {
    let info = pkg_info(name, version);
    let mut builder = tar::Builder::new(Vec::new());
    for (path, body) in [
        (format!("{name}-{version}/setup.py"), "from setuptools import setup\n"),
        (format!("{name}-{version}/PKG-INFO"), info.as_str()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, body.as_bytes()).unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();
    encoder.finish().unwrap()
}

/// A wheel with `{dist}-{version}.dist-info/METADATA`.
pub fn wheel(name: &str, version: &str) -> Vec<u8> {
    let dist = name.replace(['-', '.', ' '], "_");
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(format!("{dist}/__init__.py"), SimpleFileOptions::default())
        .unwrap();
    writer
        .start_file(
            format!("{dist}-{version}.dist-info/METADATA"),
            SimpleFileOptions::default(),
        )
        .unwrap();
    writer.write_all(pkg_info(name, version).as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}
