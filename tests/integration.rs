use bundlekit::cli::{make_bundle, MakeOptions};
use bundlekit::formats::zip_io::ZipPackWriter;
use bundlekit::{
    create_source, BundleError, BundleProps, BundleSource, BundleType, Entry, MasterKey,
    PropsPayload, SourceOptions,
};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

/// Drain a bundle into (info text, props payload, path -> content)
async fn collect(
    opts: &SourceOptions,
) -> Result<(String, PropsPayload, BTreeMap<String, Vec<u8>>), Box<dyn Error>> {
    let mut source = create_source(opts)?;
    let mut info = String::new();
    let mut props = PropsPayload::Plain(BundleProps::new());
    let mut files = BTreeMap::new();
    while let Some(entry) = source.next_entry().await? {
        match entry {
            Entry::BundleInfo(i) => info = i.to_canonical_text(),
            Entry::BundleProps(p) => props = p,
            Entry::File(file) => {
                let data = file.content.read_to_end().await?;
                files.insert(file.bundle_path, data);
            }
            Entry::End => break,
        }
    }
    Ok((info, props, files))
}

fn plain_text(payload: &PropsPayload) -> String {
    payload
        .as_plain()
        .map(BundleProps::to_canonical_text)
        .unwrap_or_default()
}

fn write_site(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join("css"))?;
    fs::write(root.join("index.html"), b"<html><body>hello</body></html>")?;
    fs::write(root.join("css/site.css"), b"body { color: black; }")?;
    Ok(())
}

async fn write_zip(path: &Path, files: &[(&str, &[u8])]) -> Result<(), Box<dyn Error>> {
    let mut writer = ZipPackWriter::create(path).await?;
    for (name, data) in files {
        writer.add_bytes(name, data.to_vec()).await?;
    }
    writer.finish().await?;
    Ok(())
}

#[tokio::test]
async fn directory_to_archive_keeps_info_and_props() -> TestResult {
    let dir = tempdir()?;
    let site = dir.path().join("site");
    write_site(&site)?;
    let archive = dir.path().join("site.aggregion");

    let mut input = SourceOptions::new(&site);
    input.info = Some(BundleProps::from_mapping([("foo", "bar")]));
    input.props = Some(BundleProps::from_mapping([("main_file", "index.html")]));

    let mut directory = create_source(&input)?;
    directory.ready().await?;
    let expected_info = directory.info()?.to_canonical_text();
    let expected_props = plain_text(directory.props()?);
    assert!(expected_info.contains(r#""foo":{"type":"string","value":"bar"}"#));

    let mut sink = bundlekit::create_sink(&bundlekit::SinkOptions::new(&archive)).await?;
    let summary = bundlekit::pump(directory.as_mut(), &mut [], sink.as_mut()).await?;
    assert_eq!(summary.files, 2);

    let mut written = create_source(&SourceOptions::new(&archive))?;
    written.ready().await?;
    assert_eq!(written.files_count()?, 2);
    assert_eq!(written.info()?.to_canonical_text(), expected_info);
    assert_eq!(plain_text(written.props()?), expected_props);
    assert_eq!(
        written.files()?,
        &["css/site.css".to_string(), "index.html".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn zip_without_props_infers_index_html() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("plain.zip");
    write_zip(&path, &[("index.html", b"<html/>"), ("img/a.png", b"png")]).await?;

    let mut source = create_source(&SourceOptions::new(&path))?;
    source.ready().await?;
    let props = source.props()?.as_plain().ok_or("props should be plain")?;
    assert_eq!(props.get_str("main_file"), Some("index.html"));
    Ok(())
}

#[tokio::test]
async fn zip_prefers_index_pdf_over_index_html() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("both.zip");
    write_zip(&path, &[("index.html", b"<html/>"), ("index.pdf", b"%PDF")]).await?;

    let mut source = create_source(&SourceOptions::new(&path))?;
    source.ready().await?;
    let props = source.props()?.as_plain().ok_or("props should be plain")?;
    assert_eq!(props.get_str("main_file"), Some("index.pdf"));
    Ok(())
}

#[tokio::test]
async fn zip_without_index_fails_to_initialize() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("noindex.zip");
    write_zip(&path, &[("readme.txt", b"nothing here")]).await?;

    let mut source = create_source(&SourceOptions::new(&path))?;
    let err = source.ready().await.unwrap_err();
    assert!(
        matches!(err, BundleError::IndexResolution(_)),
        "unexpected error: {}",
        err
    );
    // Failure is sticky
    assert!(matches!(
        source.next_entry().await,
        Err(BundleError::InitFailed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn encrypt_then_decrypt_is_byte_identical() -> TestResult {
    let dir = tempdir()?;
    let site = dir.path().join("site");
    write_site(&site)?;
    let plain = dir.path().join("plain.agb");
    let sealed = dir.path().join("sealed.agb");
    let opened = dir.path().join("opened.agb");
    let key = MasterKey::from_hex(&"0f".repeat(32))?;

    let index = MakeOptions {
        index: Some("index.html".into()),
        ..Default::default()
    };
    make_bundle(&site, &plain, &index).await?;

    let encrypt = MakeOptions {
        output_key: Some(key.clone()),
        ..Default::default()
    };
    make_bundle(&plain, &sealed, &encrypt).await?;

    let decrypt = MakeOptions {
        input_key: Some(key),
        ..Default::default()
    };
    make_bundle(&sealed, &opened, &decrypt).await?;

    let before = collect(&SourceOptions::new(&plain)).await?;
    let after = collect(&SourceOptions::new(&opened)).await?;
    assert_eq!(before.0, after.0, "bundle info must survive");
    assert_eq!(plain_text(&before.1), plain_text(&after.1));
    assert_eq!(before.2, after.2, "file contents must survive");

    // Sealed bundle holds ciphertext
    let mut sealed_opts = SourceOptions::new(&sealed);
    sealed_opts.encrypted = true;
    let (info, props, files) = collect(&sealed_opts).await?;
    assert_eq!(info, before.0, "bundle info is never encrypted");
    assert!(props.is_sealed());
    assert_ne!(files.get("index.html"), before.2.get("index.html"));
    Ok(())
}

#[tokio::test]
async fn wrong_key_does_not_reproduce_content() -> TestResult {
    let dir = tempdir()?;
    let input = dir.path().join("book.pdf");
    fs::write(&input, vec![0x25u8; 100])?;
    let sealed = dir.path().join("book.agb");
    let opened = dir.path().join("opened.agb");

    let encrypt = MakeOptions {
        output_key: Some(MasterKey::from_slice(&[1u8; 32])?),
        ..Default::default()
    };
    make_bundle(&input, &sealed, &encrypt).await?;

    let wrong = MakeOptions {
        input_key: Some(MasterKey::from_slice(&[2u8; 32])?),
        ..Default::default()
    };
    // Padding check usually rejects the wrong key; if not, content differs
    match make_bundle(&sealed, &opened, &wrong).await {
        Err(_) => {}
        Ok(_) => {
            let (_, _, files) = collect(&SourceOptions::new(&opened)).await?;
            assert_ne!(files.get("index.pdf"), Some(&vec![0x25u8; 100]));
        }
    }
    Ok(())
}

#[tokio::test]
async fn agb_and_archive_convert_both_ways() -> TestResult {
    let dir = tempdir()?;
    let site = dir.path().join("site");
    write_site(&site)?;
    let first = dir.path().join("first.agb");
    let middle = dir.path().join("middle.aggregion");
    let last = dir.path().join("last.agb");

    let index = MakeOptions {
        index: Some("index.html".into()),
        ..Default::default()
    };
    make_bundle(&site, &first, &index).await?;
    make_bundle(&first, &middle, &MakeOptions::default()).await?;
    make_bundle(&middle, &last, &MakeOptions::default()).await?;

    let a = collect(&SourceOptions::new(&first)).await?;
    let b = collect(&SourceOptions::new(&last)).await?;
    assert_eq!(a.0, b.0);
    assert_eq!(plain_text(&a.1), plain_text(&b.1));
    assert_eq!(a.2, b.2);
    Ok(())
}

#[tokio::test]
async fn single_file_to_web_export() -> TestResult {
    let dir = tempdir()?;
    let input = dir.path().join("Paper.PDF");
    fs::write(&input, b"%PDF-1.7")?;
    let out = dir.path().join("site");

    let options = MakeOptions {
        output_type: Some(BundleType::Web),
        ..Default::default()
    };
    let summary = make_bundle(&input, &out, &options).await?;
    assert_eq!(summary.files, 1);
    assert_eq!(fs::read(out.join("_data/index.pdf"))?, b"%PDF-1.7");
    let page = fs::read_to_string(out.join("index.html"))?;
    assert!(page.contains("index.pdf"));
    assert!(out.join("common/bundle.js").exists());
    Ok(())
}

#[tokio::test]
async fn epub_source_points_at_package_document() -> TestResult {
    let dir = tempdir()?;
    let book = dir.path().join("novel.epub");
    write_zip(
        &book,
        &[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/Content.OPF", b"<package/>"),
            ("OEBPS/ch1.xhtml", b"<html/>"),
        ],
    )
    .await?;

    let mut source = create_source(&SourceOptions::new(&book))?;
    source.ready().await?;
    let props = source.props()?.as_plain().ok_or("props should be plain")?;
    assert_eq!(props.get_str("main_file"), Some("OEBPS/Content.OPF"));
    assert_eq!(source.files_count()?, 3);
    Ok(())
}
