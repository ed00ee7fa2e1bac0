use anyhow::Result;

use appbox_hypervisor::Stream;

use crate::images::{filter_names, ImageStore};

pub fn run(
    store: &ImageStore,
    remote: bool,
    stream: Option<Stream>,
    version: Option<&str>,
    filter: Option<&str>,
) -> Result<()> {
    let names = if remote {
        store.remote_images(stream.unwrap_or(Stream::Community), version)?
    } else {
        store.local_images(stream, version)?
    };
    let names = filter_names(names, filter);

    if names.is_empty() {
        println!("no images found");
        return Ok(());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}
