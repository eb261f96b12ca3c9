#![no_main]

use libfuzzer_sys::fuzz_target;
use meshreg_proto::{tlv, DuaNotification, DuaRequest, DuaResponse};

fuzz_target!(|data: &[u8]| {
    // TLV walking must terminate without panicking
    for item in tlv::iter(data) {
        if item.is_err() {
            break;
        }
    }

    if let Ok(request) = DuaRequest::decode(data) {
        let encoded = request.encode().expect("decoded request re-encodes");
        assert_eq!(DuaRequest::decode(&encoded).expect("re-encoded request decodes"), request);
    }

    if let Ok(response) = DuaResponse::decode(data) {
        let encoded = response.encode().expect("decoded response re-encodes");
        assert_eq!(DuaResponse::decode(&encoded).expect("re-encoded response decodes"), response);
    }

    let _ = DuaNotification::decode(data);
});
