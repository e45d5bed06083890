use bytes::Bytes;

use super::*;

fn sample() -> ScalabilityStructure {
    ScalabilityStructure {
        n_s: 1,
        y_flag: false,
        n_g: 2,
        spatial_layers: vec![
            SpatialLayer {
                width: 320,
                height: 180,
                frame_rate: Some(30),
            },
            SpatialLayer {
                width: 640,
                height: 360,
                frame_rate: Some(30),
            },
        ],
        picture_descriptors: vec![
            PictureDescriptor {
                temporal_id: 0,
                spatial_id: 0,
                p_diffs: vec![1],
            },
            PictureDescriptor {
                temporal_id: 1,
                spatial_id: 1,
                p_diffs: vec![1, 2],
            },
        ],
    }
}

#[test]
fn round_trips_through_encode_decode() {
    let ss = sample();
    let encoded = ss.encode().unwrap();
    let (decoded, consumed) = ScalabilityStructure::decode(&encoded).unwrap();
    assert_eq!(consumed, encoded.len());
    assert_eq!(decoded, ss);
}

#[test]
fn decode_leaves_trailing_bytes_unconsumed() {
    let ss = sample();
    let mut encoded = ss.encode().unwrap().to_vec();
    encoded.extend_from_slice(&[0xAA, 0xBB]);
    let (_decoded, consumed) = ScalabilityStructure::decode(&Bytes::from(encoded.clone())).unwrap();
    assert_eq!(consumed, encoded.len() - 2);
}

#[test]
fn y_flag_omits_frame_rate_bytes() {
    let mut ss = sample();
    ss.y_flag = true;
    for l in &mut ss.spatial_layers {
        l.frame_rate = None;
    }
    let encoded = ss.encode().unwrap();
    // header(1) + 2 layers * 4 bytes + 2 descriptors (1 + 1 pdiff, 1 + 2 pdiffs)
    assert_eq!(encoded.len(), 1 + 2 * 4 + (1 + 1) + (1 + 2));
}

#[test]
fn rejects_n_s_over_seven() {
    let mut ss = sample();
    ss.n_s = 8;
    assert_eq!(ss.encode().unwrap_err(), Error::InvalidNs(8));
}

#[test]
fn rejects_spatial_layer_count_mismatch() {
    let mut ss = sample();
    ss.spatial_layers.pop();
    assert_eq!(ss.encode().unwrap_err(), Error::SpatialLayerCountMismatch);
}

#[test]
fn rejects_zero_dimension_spatial_layer() {
    let mut ss = sample();
    ss.spatial_layers[0].width = 0;
    assert_eq!(ss.encode().unwrap_err(), Error::InvalidSpatialLayer);
}

#[test]
fn rejects_picture_desc_with_too_many_references() {
    let mut ss = sample();
    ss.picture_descriptors[0].p_diffs = vec![1; 8];
    assert_eq!(ss.encode().unwrap_err(), Error::InvalidPictureDesc);
}

#[test]
fn decode_rejects_truncated_spatial_layers() {
    let ss = sample();
    let mut encoded = ss.encode().unwrap().to_vec();
    encoded.truncate(3);
    let err = ScalabilityStructure::decode(&Bytes::from(encoded)).unwrap_err();
    assert_eq!(err, Error::IncompleteSpatialLayers);
}

#[test]
fn decode_rejects_truncated_picture_descriptors() {
    let ss = sample();
    let encoded = ss.encode().unwrap();
    let header_and_layers = 1 + 2 * 5;
    let truncated = encoded.slice(0..header_and_layers);
    let err = ScalabilityStructure::decode(&truncated).unwrap_err();
    assert_eq!(err, Error::IncompletePictureDesc);
}

#[test]
fn max_temporal_id_reports_highest_descriptor_value() {
    let ss = sample();
    assert_eq!(ss.max_temporal_id(), 1);
}
