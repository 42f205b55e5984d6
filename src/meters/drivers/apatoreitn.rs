//! Apator E.ITN 30.51 heat cost allocator.
//!
//! Supports E.ITN 30.51; 30.60 should be similar since the same datasheet
//! covers both. The payload is manufacturer specific and parsed by absolute
//! offsets; dates are packed as 5 bits day, 4 bits month, 5 bits year.

use crate::meters::registry::{Detection, DriverInfo, LinkMode};
use crate::meters::{Meter, DEFAULT_PRINT_PROPERTIES};
use crate::telegram::Telegram;
use crate::units::{Quantity, Unit};

pub(crate) fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "apatoreitn",
        default_fields: "name,id,current_hca,previous_hca,current_date,season_start_date,\
                         esb_date,temp_room_avg_c,temp_room_prev_avg_c,timestamp",
        link_modes: &[LinkMode::T1],
        detections: {
            const DETECTIONS: &[Detection] = &[
                Detection::new(0x8614, 0x08, 0x04),
                Detection::new(0x8601, 0x08, 0x04),
            ];
            DETECTIONS
        },
        constructor,
    }
}

fn constructor(m: &mut Meter) {
    m.set_process_content(process_content);

    m.add_numeric_field(
        "current",
        Quantity::Hca,
        DEFAULT_PRINT_PROPERTIES,
        "Energy consumption so far in this billing period.",
    );

    m.add_numeric_field(
        "previous",
        Quantity::Hca,
        DEFAULT_PRINT_PROPERTIES,
        "Energy consumption in previous billing period.",
    );

    m.add_string_field(
        "current_date",
        "Current date, as reported by meter.",
        DEFAULT_PRINT_PROPERTIES,
    );

    m.add_string_field(
        "season_start_date",
        "Season start date.",
        DEFAULT_PRINT_PROPERTIES,
    );

    m.add_string_field(
        "esb_date",
        "Electronic seal protection break date.",
        DEFAULT_PRINT_PROPERTIES,
    );

    m.add_numeric_field(
        "temp_room_avg",
        Quantity::Temperature,
        DEFAULT_PRINT_PROPERTIES,
        "Average room temperature in current season.",
    );

    m.add_numeric_field(
        "temp_room_prev_avg",
        Quantity::Temperature,
        DEFAULT_PRINT_PROPERTIES,
        "Average room temperature in previous season.",
    );
}

fn process_content(m: &mut Meter, t: &mut Telegram) -> bool {
    let mut content = t.payload().to_vec();

    match t.tpl_ci {
        Some(0xB6) => {
            // CI B6 carries a header; its first byte is the header length.
            let header_len = match content.first() {
                Some(l) => *l as usize + 1,
                None => return false,
            };
            if header_len > content.len() {
                return false;
            }
            content.drain(0..header_len);
        }
        Some(0xA0) => {
            // The CI byte is part of the data: telegrams either start
            // B0 <len> <hdr> A0 A1 ... or directly with A0 A1.
            content.insert(0, 0xA0);
        }
        _ => {}
    }

    if content.len() != 16 {
        log::debug!("(apatoreitn) content size wrong: {}", content.len());
        return false;
    }

    // Season start date. Not byte swapped, unlike the other dates.
    let season_start = date_to_string(content[1], content[0]);
    m.set_string_value("season_start_date", &season_start);

    let previous_hca = 256.0 * content[5] as f64 + content[4] as f64;
    m.set_numeric_value("previous", Unit::Hca, previous_hca);

    let esb_date = date_to_string(content[6], content[7]);
    m.set_string_value("esb_date", &esb_date);

    let current_hca = 256.0 * content[9] as f64 + content[8] as f64;
    m.set_numeric_value("current", Unit::Hca, current_hca);

    let current_date = date_to_string(content[10], content[11]);
    m.set_string_value("current_date", &current_date);

    let temp_room_prev_avg = content[13] as f64 + content[12] as f64 / 256.0;
    m.set_numeric_value("temp_room_prev_avg", Unit::C, temp_room_prev_avg);

    let temp_room_avg = content[15] as f64 + content[14] as f64 / 256.0;
    m.set_numeric_value("temp_room_avg", Unit::C, temp_room_avg);

    true
}

fn date_to_string(date_lo: u8, date_hi: u8) -> String {
    let date = 256 * date_hi as u16 + date_lo as u16;
    if date == 0 {
        return String::new();
    }
    let day = date & 0x1F;
    let month = (date >> 5) & 0x0F;
    let year = ((date >> 9) & 0x1F) + 2000;
    format!("{year}-{month:02}-{day:02}T02:00:00Z")
}

// Test: HCA1 apatoreitn 37373731 NOKEY
// telegram=|19440186313737370408A0A1000059001C270100322DE413B415|
// {"media":"heat cost allocation","meter":"apatoreitn","name":"","id":"37373731","current_hca":1,"previous_hca":89,"current_date":"2022-09-18T02:00:00Z","season_start_date":"2016-05-01T02:00:00Z","esb_date":"2019-08-28T02:00:00Z","temp_room_avg_c":21.703125,"temp_room_prev_avg_c":19.890625,"timestamp":"1111-11-11T11:11:11Z"}

// Test: HCA2 apatoreitn 37373732 NOKEY
// telegram=|25441486323737370408B60AFFFFF5450186F41B9D58A0A100007809000000001F2D6416C819|
// {"media":"heat cost allocation","meter":"apatoreitn","name":"","id":"37373732","current_hca":0,"previous_hca":2424,"current_date":"2022-08-31T02:00:00Z","season_start_date":"2016-05-01T02:00:00Z","esb_date":"","temp_room_avg_c":25.78125,"temp_room_prev_avg_c":22.390625,"timestamp":"1111-11-11T11:11:11Z"}
