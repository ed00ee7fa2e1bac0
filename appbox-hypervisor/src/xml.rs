//! XML generation and parsing for libvirt descriptors.
//!
//! Pool, volume and domain descriptors are assembled as strings, matching
//! the fixed hardware layout the appliance images expect. The parsing
//! helpers pull the two fields teardown and lookup need back out of a
//! domain's persisted XML: disk source paths and the description text.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{HypervisorError, Result};
use crate::types::{DomainConfig, PoolConfig, VolumeRequest};

/// Directory-backed storage pool descriptor.
pub fn pool_xml(config: &PoolConfig) -> String {
    format!(
        r#"<pool type='dir'>
  <name>{}</name>
  <target>
    <path>{}</path>
    <permissions>
      <mode>0755</mode>
      <owner>-1</owner>
      <group>-1</group>
    </permissions>
  </target>
</pool>
"#,
        config.name,
        config.path.display()
    )
}

/// Volume descriptor.
///
/// Ownership, mode and the security label are fixed to what the appliance
/// OS image ships with; the target format is always qcow2 even when the
/// file name carries the community `qc2` suffix.
pub fn volume_xml(pool_path: &Path, request: &VolumeRequest) -> String {
    format!(
        r#"<volume>
  <name>{name}</name>
  <allocation>0</allocation>
  <capacity unit="G">{capacity}</capacity>
  <target>
    <format type="qcow2"/>
    <path>{path}/{name}</path>
    <permissions>
      <owner>107</owner>
      <group>107</group>
      <mode>0744</mode>
      <label>virt_image_t</label>
    </permissions>
  </target>
</volume>
"#,
        name = request.file_name(),
        capacity = request.capacity_gb,
        path = pool_path.display()
    )
}

/// Builder for the appliance domain XML.
pub struct DomainXmlBuilder<'a> {
    config: &'a DomainConfig,
}

impl<'a> DomainXmlBuilder<'a> {
    pub fn new(config: &'a DomainConfig) -> Self {
        Self { config }
    }

    /// Build the domain XML string.
    pub fn build(&self) -> String {
        let mut xml = String::new();

        xml.push_str(&format!(
            r#"<domain type='kvm'>
  <name>{}</name>
  <description>{}</description>
  <memory unit='G'>{}</memory>
  <currentMemory unit='G'>{}</currentMemory>
  <vcpu placement='static'>{}</vcpu>
  <resource>
    <partition>/machine</partition>
  </resource>
"#,
            self.config.name,
            self.config.description,
            self.config.memory_gb,
            self.config.memory_gb,
            self.config.vcpus
        ));

        xml.push_str(
            r#"  <os>
    <type arch='x86_64' machine='pc-i440fx-2.11'>hvm</type>
    <boot dev='hd'/>
  </os>
  <features>
    <acpi/>
    <apic/>
    <vmport state='off'/>
  </features>
  <clock offset='utc'>
    <timer name='rtc' tickpolicy='catchup'/>
    <timer name='pit' tickpolicy='delay'/>
    <timer name='hpet' present='no'/>
  </clock>
  <on_poweroff>destroy</on_poweroff>
  <on_reboot>restart</on_reboot>
  <on_crash>destroy</on_crash>
  <pm>
    <suspend-to-mem enabled='no'/>
    <suspend-to-disk enabled='no'/>
  </pm>
"#,
        );

        xml.push_str("  <devices>\n");
        xml.push_str("    <emulator>/usr/bin/qemu-kvm</emulator>\n");
        xml.push_str(&self.build_disk(&self.config.base_disk, "vda", 0, 0x07));
        xml.push_str(&self.build_disk(&self.config.data_disk, "vdb", 1, 0x08));
        xml.push_str(&self.build_interface());
        xml.push_str(
            r#"    <input type='mouse' bus='ps2'>
      <alias name='input1'/>
    </input>
    <input type='keyboard' bus='ps2'>
      <alias name='input2'/>
    </input>
    <graphics type='spice' port='5900' autoport='yes' listen='127.0.0.1'>
      <listen type='address' address='127.0.0.1'/>
      <image compression='off'/>
    </graphics>
    <sound model='ich6'>
      <alias name='sound0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x04' function='0x0'/>
    </sound>
    <video>
      <model type='qxl' ram='65536' vram='65536' vgamem='16384' heads='1' primary='yes'/>
      <alias name='video0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x02' function='0x0'/>
    </video>
"#,
        );
        xml.push_str("  </devices>\n");
        xml.push_str("</domain>\n");

        xml
    }

    fn build_disk(&self, source: &Path, dev: &str, index: u32, slot: u32) -> String {
        format!(
            r#"    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='{}'/>
      <backingStore/>
      <target dev='{}' bus='virtio'/>
      <alias name='virtio-disk{}'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x{:02x}' function='0x0'/>
    </disk>
"#,
            source.display(),
            dev,
            index,
            slot
        )
    }

    fn build_interface(&self) -> String {
        format!(
            r#"    <interface type='network'>
      <source network='{}' bridge='{}'/>
      <target dev='vnet0'/>
      <model type='virtio'/>
      <alias name='net0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x03' function='0x0'/>
    </interface>
"#,
            self.config.network, self.config.bridge
        )
    }
}

/// Extract the `source file=` paths of every `<disk>` element.
///
/// The interface element also carries a `<source>` child, but without a
/// `file` attribute, so only real disks are collected.
pub fn disk_sources(xml: &str) -> Result<Vec<PathBuf>> {
    let mut reader = Reader::from_str(xml);
    let mut sources = Vec::new();
    let mut in_disk = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"disk" => in_disk = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"disk" => in_disk = false,
            Ok(Event::Empty(e)) if in_disk && e.name().as_ref() == b"source" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| HypervisorError::XmlError(e.to_string()))?;
                    if attr.key.as_ref() == b"file" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| HypervisorError::XmlError(e.to_string()))?;
                        sources.push(PathBuf::from(value.as_ref()));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(HypervisorError::XmlError(e.to_string())),
            _ => {}
        }
    }

    Ok(sources)
}

/// Extract the `<target><path>` of a pool descriptor.
pub fn pool_path(xml: &str) -> Result<Option<PathBuf>> {
    let mut reader = Reader::from_str(xml);
    let mut in_target = false;
    let mut in_path = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"target" => in_target = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"target" => in_target = false,
            Ok(Event::Start(e)) if in_target && e.name().as_ref() == b"path" => in_path = true,
            Ok(Event::Text(t)) if in_path => {
                let text = t
                    .unescape()
                    .map_err(|e| HypervisorError::XmlError(e.to_string()))?;
                return Ok(Some(PathBuf::from(text.trim())));
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"path" => in_path = false,
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(HypervisorError::XmlError(e.to_string())),
            _ => {}
        }
    }
}

/// Extract the free-text `<description>` of a domain, if present.
pub fn description(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    let mut in_description = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"description" => in_description = true,
            Ok(Event::Text(t)) if in_description => {
                let text = t
                    .unescape()
                    .map_err(|e| HypervisorError::XmlError(e.to_string()))?;
                return Ok(Some(text.trim().to_string()));
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"description" => return Ok(None),
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(HypervisorError::XmlError(e.to_string())),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DomainConfig {
        DomainConfig::new(
            "cfme-59",
            PathBuf::from("/var/lib/libvirt/images/cfme-59.qc2"),
            PathBuf::from("/var/lib/libvirt/images/cfme-59-db.qc2"),
        )
        .with_description("community-kvm-5.9.0.1")
        .with_memory_gb(4)
        .with_vcpus(2)
    }

    #[test]
    fn pool_xml_layout() {
        let xml = pool_xml(&PoolConfig {
            name: "default".to_string(),
            path: PathBuf::from("/var/lib/libvirt/images"),
        });

        assert!(xml.contains("<pool type='dir'>"));
        assert!(xml.contains("<name>default</name>"));
        assert!(xml.contains("<path>/var/lib/libvirt/images</path>"));
        assert!(xml.contains("<mode>0755</mode>"));
        assert!(xml.contains("<owner>-1</owner>"));
    }

    #[test]
    fn volume_xml_fixed_permissions() {
        let request = VolumeRequest::new("cfme-59-db", 5, "qc2");
        let xml = volume_xml(Path::new("/var/lib/libvirt/images"), &request);

        assert!(xml.contains("<name>cfme-59-db.qc2</name>"));
        assert!(xml.contains(r#"<capacity unit="G">5</capacity>"#));
        assert!(xml.contains(r#"<format type="qcow2"/>"#));
        assert!(xml.contains("<path>/var/lib/libvirt/images/cfme-59-db.qc2</path>"));
        assert!(xml.contains("<owner>107</owner>"));
        assert!(xml.contains("<group>107</group>"));
        assert!(xml.contains("<mode>0744</mode>"));
        assert!(xml.contains("<label>virt_image_t</label>"));
    }

    #[test]
    fn domain_xml_layout() {
        let xml = DomainXmlBuilder::new(&sample_config()).build();

        assert!(xml.contains("<name>cfme-59</name>"));
        assert!(xml.contains("<description>community-kvm-5.9.0.1</description>"));
        assert!(xml.contains("<memory unit='G'>4</memory>"));
        assert!(xml.contains("<vcpu placement='static'>2</vcpu>"));
        assert!(xml.contains("machine='pc-i440fx-2.11'"));
        assert!(xml.contains("<source file='/var/lib/libvirt/images/cfme-59.qc2'/>"));
        assert!(xml.contains("<source file='/var/lib/libvirt/images/cfme-59-db.qc2'/>"));
        assert!(xml.contains("<target dev='vda' bus='virtio'/>"));
        assert!(xml.contains("<target dev='vdb' bus='virtio'/>"));
        assert!(xml.contains("slot='0x07'"));
        assert!(xml.contains("slot='0x08'"));
        assert!(xml.contains("<source network='default' bridge='virbr0'/>"));
        assert!(xml.contains("graphics type='spice'"));
        assert!(xml.contains("model type='qxl'"));
    }

    #[test]
    fn disk_sources_from_built_domain() {
        let xml = DomainXmlBuilder::new(&sample_config()).build();
        let sources = disk_sources(&xml).unwrap();

        assert_eq!(
            sources,
            vec![
                PathBuf::from("/var/lib/libvirt/images/cfme-59.qc2"),
                PathBuf::from("/var/lib/libvirt/images/cfme-59-db.qc2"),
            ]
        );
    }

    #[test]
    fn disk_sources_skip_interface_source() {
        let xml = DomainXmlBuilder::new(&sample_config()).build();
        let sources = disk_sources(&xml).unwrap();

        assert_eq!(sources.len(), 2);
        assert!(!sources.iter().any(|p| p.to_string_lossy().contains("default")));
    }

    #[test]
    fn pool_path_round_trip() {
        let xml = pool_xml(&PoolConfig {
            name: "default".to_string(),
            path: PathBuf::from("/var/lib/libvirt/images"),
        });

        let path = pool_path(&xml).unwrap();
        assert_eq!(path, Some(PathBuf::from("/var/lib/libvirt/images")));
    }

    #[test]
    fn description_round_trip() {
        let xml = DomainXmlBuilder::new(&sample_config()).build();
        let desc = description(&xml).unwrap();

        assert_eq!(desc.as_deref(), Some("community-kvm-5.9.0.1"));
    }

    #[test]
    fn description_absent() {
        let xml = "<domain type='kvm'><name>bare</name></domain>";
        assert_eq!(description(xml).unwrap(), None);
    }
}
