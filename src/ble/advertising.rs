//! Advertising payload builder
//!
//! Assembles legacy advertising data as a sequence of AD structures
//! (`[len][type][payload]`). Appends that would push the packet past the
//! 31-byte budget are dropped or shortened, never rejected, so callers
//! append in priority order: flags and service UUIDs first, then the name,
//! then manufacturer data.

use super::uuid::BleUuid;

/// Maximum length of legacy advertising data.
pub const MAX_ADV_DATA_LEN: usize = 31;

/// AD type: flags.
pub const AD_FLAGS: u8 = 0x01;
/// AD type: incomplete list of 16-bit service UUIDs.
pub const AD_SOME_UUID16: u8 = 0x02;
/// AD type: complete list of 16-bit service UUIDs.
pub const AD_ALL_UUID16: u8 = 0x03;
/// AD type: incomplete list of 128-bit service UUIDs.
pub const AD_SOME_UUID128: u8 = 0x06;
/// AD type: complete list of 128-bit service UUIDs.
pub const AD_ALL_UUID128: u8 = 0x07;
/// AD type: shortened local name.
pub const AD_SHORT_NAME: u8 = 0x08;
/// AD type: complete local name.
pub const AD_COMPLETE_NAME: u8 = 0x09;
/// AD type: manufacturer specific data.
pub const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// LE Limited Discoverable Mode.
pub const FLAG_LIMITED_DISCOVERABLE: u8 = 0x01;
/// LE General Discoverable Mode.
pub const FLAG_GENERAL_DISCOVERABLE: u8 = 0x02;
/// BR/EDR not supported.
pub const FLAG_LE_ONLY: u8 = 0x04;
/// Simultaneous LE and BR/EDR, controller.
pub const FLAG_BOTH_CONTROLLER: u8 = 0x08;
/// Simultaneous LE and BR/EDR, host.
pub const FLAG_BOTH_HOST: u8 = 0x10;

/// One decoded AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdField {
    pub ad_type: u8,
    pub data: Vec<u8>,
}

/// A legacy advertising payload under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvPacket {
    buf: Vec<u8>,
}

impl AdvPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes still available before the packet hits the budget.
    pub fn remaining(&self) -> usize {
        MAX_ADV_DATA_LEN - self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append a raw AD structure. Returns false, leaving the packet
    /// untouched, when the field does not fit.
    pub fn append_field(&mut self, ad_type: u8, data: &[u8]) -> bool {
        if 2 + data.len() > self.remaining() {
            return false;
        }
        self.buf.push((data.len() + 1) as u8);
        self.buf.push(ad_type);
        self.buf.extend_from_slice(data);
        true
    }

    pub fn append_flags(&mut self, flags: u8) {
        self.append_field(AD_FLAGS, &[flags]);
    }

    /// Append as many service UUIDs as fit, one AD structure each, keeping
    /// list order. The list is tagged complete only if every UUID made it.
    ///
    /// Returns the number of UUIDs included, always a prefix of `uuids`.
    pub fn append_uuid_fit(&mut self, uuids: &[BleUuid]) -> usize {
        let needed: usize = uuids.iter().map(|u| 2 + u.len()).sum();
        let complete = needed <= self.remaining();

        let mut included = 0;
        for uuid in uuids {
            let ad_type = match (uuid, complete) {
                (BleUuid::Uuid16(_), true) => AD_ALL_UUID16,
                (BleUuid::Uuid16(_), false) => AD_SOME_UUID16,
                (BleUuid::Uuid128(_), true) => AD_ALL_UUID128,
                (BleUuid::Uuid128(_), false) => AD_SOME_UUID128,
            };
            if !self.append_field(ad_type, &uuid.to_le_bytes()) {
                break;
            }
            included += 1;
        }
        included
    }

    /// Append the local name, shortening it to whatever room is left.
    pub fn append_name(&mut self, name: &str) {
        if self.append_field(AD_COMPLETE_NAME, name.as_bytes()) {
            return;
        }
        let room = self.remaining().saturating_sub(2);
        let mut end = room.min(name.len());
        while end > 0 && !name.is_char_boundary(end) {
            end -= 1;
        }
        if end > 0 {
            self.append_field(AD_SHORT_NAME, &name.as_bytes()[..end]);
        }
    }

    /// Append manufacturer specific data: company id (LE) then payload.
    pub fn append_manufacturer_data(&mut self, company_id: u16, payload: &[u8]) {
        let mut data = Vec::with_capacity(2 + payload.len());
        data.extend_from_slice(&company_id.to_le_bytes());
        data.extend_from_slice(payload);
        self.append_field(AD_MANUFACTURER_DATA, &data);
    }

    /// Decode the packet back into its AD structures.
    pub fn fields(&self) -> Vec<AdField> {
        parse_fields(&self.buf)
    }
}

/// Walk `[len][type][data]...` structures. Stops at a zero length or a
/// structure running past the end of the buffer.
pub fn parse_fields(raw: &[u8]) -> Vec<AdField> {
    let mut fields = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let len = raw[i] as usize;
        if len == 0 || i + 1 + len > raw.len() {
            break;
        }
        fields.push(AdField {
            ad_type: raw[i + 1],
            data: raw[i + 2..i + 1 + len].to_vec(),
        });
        i += 1 + len;
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid16s(n: u16) -> Vec<BleUuid> {
        (0..n).map(|i| BleUuid::Uuid16(0xFE00 + i)).collect()
    }

    #[test]
    fn test_flags_field_layout() {
        let mut packet = AdvPacket::new();
        packet.append_flags(FLAG_GENERAL_DISCOVERABLE | FLAG_LE_ONLY);
        assert_eq!(packet.as_bytes(), &[0x02, 0x01, 0x06]);
    }

    #[test]
    fn test_single_uuid_is_complete_list() {
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        let n = packet.append_uuid_fit(&[BleUuid::Uuid16(0xFEE7)]);
        assert_eq!(n, 1);
        assert_eq!(&packet.as_bytes()[3..], &[0x03, AD_ALL_UUID16, 0xE7, 0xFE]);
    }

    #[test]
    fn test_uuid_fit_takes_maximum_prefix() {
        // 3 bytes of flags leave 28, i.e. seven 4-byte 16-bit UUID fields.
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        let uuids = uuid16s(10);
        let n = packet.append_uuid_fit(&uuids);
        assert_eq!(n, 7);
        assert_eq!(packet.len(), MAX_ADV_DATA_LEN);

        let fields = packet.fields();
        assert_eq!(fields.len(), 8);
        for (field, uuid) in fields[1..].iter().zip(&uuids) {
            assert_eq!(field.ad_type, AD_SOME_UUID16);
            assert_eq!(field.data, uuid.to_le_bytes());
        }
    }

    #[test]
    fn test_uuid_fit_never_exceeds_budget() {
        for count in 0..20u16 {
            for with_flags in [false, true] {
                let mut packet = AdvPacket::new();
                if with_flags {
                    packet.append_flags(0x06);
                }
                let budget = packet.remaining();
                let mut uuids = uuid16s(count);
                if count % 3 == 0 {
                    uuids.insert(0, BleUuid::Uuid128(uuid::Uuid::new_v4()));
                }

                let n = packet.append_uuid_fit(&uuids);
                assert!(packet.len() <= MAX_ADV_DATA_LEN);

                // n is the longest prefix whose encoded size fits the budget.
                let size = |k: usize| uuids[..k].iter().map(|u| 2 + u.len()).sum::<usize>();
                assert!(size(n) <= budget);
                if n < uuids.len() {
                    assert!(size(n + 1) > budget);
                }
            }
        }
    }

    #[test]
    fn test_uuid128_types() {
        let mut packet = AdvPacket::new();
        let uuid = BleUuid::Uuid128(uuid::Uuid::new_v4());
        assert_eq!(packet.append_uuid_fit(&[uuid]), 1);
        assert_eq!(packet.fields()[0].ad_type, AD_ALL_UUID128);

        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        assert_eq!(packet.append_uuid_fit(&[uuid, uuid]), 1);
        assert_eq!(packet.fields()[1].ad_type, AD_SOME_UUID128);
    }

    #[test]
    fn test_name_shortened_when_out_of_room() {
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        packet.append_uuid_fit(&uuid16s(5));
        // 3 + 20 = 23 used, 8 left: header + 6 name bytes.
        packet.append_name("WeixinBLE");

        let name = packet.fields().pop().unwrap();
        assert_eq!(name.ad_type, AD_SHORT_NAME);
        assert_eq!(name.data, b"Weixin".to_vec());
        assert_eq!(packet.len(), MAX_ADV_DATA_LEN);
    }

    #[test]
    fn test_name_shortened_on_char_boundary() {
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        packet.append_uuid_fit(&uuid16s(6));
        // 4 bytes left: room for a 2-byte name, but "é" is 2 bytes after "a".
        packet.append_name("aé!");
        let name = packet.fields().pop().unwrap();
        assert_eq!(name.ad_type, AD_SHORT_NAME);
        assert_eq!(name.data, b"a".to_vec());
    }

    #[test]
    fn test_name_omitted_when_packet_full() {
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        packet.append_uuid_fit(&uuid16s(7));
        packet.append_name("WeixinBLE");
        assert_eq!(packet.fields().len(), 8);
    }

    #[test]
    fn test_manufacturer_data_layout() {
        let mut packet = AdvPacket::new();
        packet.append_manufacturer_data(0x2333, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            packet.as_bytes(),
            &[0x09, 0xFF, 0x33, 0x23, 1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn test_manufacturer_data_omitted_when_too_large() {
        let mut packet = AdvPacket::new();
        packet.append_flags(0x06);
        packet.append_name("A long enough device name");
        let before = packet.clone();
        packet.append_manufacturer_data(0x2333, &[0u8; 6]);
        assert_eq!(packet, before);
    }

    #[test]
    fn test_parse_stops_on_truncated_field() {
        let fields = parse_fields(&[0x02, 0x01, 0x06, 0x05, 0x09, b'a']);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].ad_type, AD_FLAGS);
    }
}
