use mseed2sac::{
    decode_record, pack, read_traces, sac, zip, ByteOrder, CodecConfig, DataEncoding, HpTime,
    MSeedError, Reader, ReaderConfig, Record, Samples, Tolerance, HPTMODULUS,
};

fn sinusoid(count: usize) -> Vec<i32> {
    (0..count)
        .map(|i| (5000.0 * (i as f64 / 25.0).sin()) as i32)
        .collect()
}

fn packed_records(
    start: HpTime,
    rate: f64,
    data: &[i32],
    reclen: usize,
    encoding: DataEncoding,
    order: ByteOrder,
) -> Vec<Vec<u8>> {
    let mut template = Record::template("XX", "TEST", "00", "BHZ", start, rate);
    template.reclen = reclen;
    template.encoding = encoding;
    template.header_byte_order = order;
    template.byte_order = order;
    let samples = Samples::Int32(data.to_vec());
    let mut sink: Vec<Vec<u8>> = Vec::new();
    pack(
        &mut template,
        &samples,
        &mut sink,
        true,
        &CodecConfig::default(),
    )
    .unwrap();
    sink
}

#[test]
fn steim2_record_decode_and_reencode() -> Result<(), MSeedError> {
    // a single 4096-byte Steim-2 record with 500 samples
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(500);
    let records = packed_records(start, 20.0, &data, 4096, DataEncoding::STEIM2, ByteOrder::Big);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].len(), 4096);

    let config = CodecConfig::default();
    let rec = decode_record(&records[0], 4096, true, &config)?;
    assert_eq!(rec.reclen, 4096);
    assert_eq!(rec.encoding.value(), 11);
    assert_eq!(rec.sample_count, 500);
    assert_eq!(rec.decoded_sample_count(), 500);
    assert_eq!(rec.start_time, start);
    assert_eq!(rec.samples, Some(Samples::Int32(data.clone())));
    assert!(rec.blockette(1000).is_some());

    // re-encoding with the decoded record as template is bit identical
    let mut template = rec.clone();
    let mut sink: Vec<Vec<u8>> = Vec::new();
    pack(
        &mut template,
        rec.samples.as_ref().unwrap(),
        &mut sink,
        true,
        &config,
    )?;
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0], records[0]);
    Ok(())
}

#[test]
fn reader_autodetects_record_length() -> Result<(), MSeedError> {
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(3000);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM2, ByteOrder::Big);
    assert!(records.len() > 1);
    let stream: Vec<u8> = records.concat();

    let mut reader = Reader::new(&stream[..], ReaderConfig::default());
    let mut total = 0usize;
    let mut all: Vec<i32> = Vec::new();
    while let Some(rec) = reader.next_record()? {
        assert_eq!(rec.reclen, 512);
        total += rec.decoded_sample_count();
        match rec.samples {
            Some(Samples::Int32(v)) => all.extend_from_slice(&v),
            other => panic!("unexpected samples {:?}", other),
        }
    }
    assert_eq!(reader.record_count() as usize, records.len());
    assert_eq!(total, data.len());
    assert_eq!(all, data);
    Ok(())
}

#[test]
fn little_endian_records_detected() -> Result<(), MSeedError> {
    let start = HpTime::parse_seed("2015,001,12:00:00")?;
    let data = sinusoid(400);
    let records = packed_records(
        start,
        1.0,
        &data,
        1024,
        DataEncoding::STEIM2,
        ByteOrder::Little,
    );
    let rec = decode_record(&records[0], 1024, true, &CodecConfig::default())?;
    assert_eq!(rec.header_byte_order, ByteOrder::Little);
    assert_eq!(rec.byte_order, ByteOrder::Little);
    assert_eq!(rec.start_time, start);
    match rec.samples.unwrap() {
        Samples::Int32(v) => assert_eq!(&v[..], &data[..v.len()]),
        other => panic!("unexpected samples {}", other),
    }
    Ok(())
}

#[test]
fn fallback_encoding_without_blockette_1000() -> Result<(), MSeedError> {
    // hand-build a record with no blockettes at all
    use mseed2sac::header::{open_field, Fsdh};
    use mseed2sac::steim1;

    let data: Vec<i32> = (0..100).map(|i| i * 3 - 150).collect();
    let block = steim1::encode(&data, 7, ByteOrder::Big)?;
    assert_eq!(block.num_samples, data.len());

    let mut raw = vec![0u8; 512];
    let mut fsdh = Fsdh {
        dataquality: b'D',
        reserved: b' ',
        start_time: HpTime::parse_seed("2004,222,16:44:57")?.to_btime()?,
        numsamples: data.len() as u16,
        samprate_fact: 40,
        samprate_mult: 1,
        numblockettes: 0,
        data_offset: 64,
        blockette_offset: 0,
        ..Default::default()
    };
    fsdh.sequence_number.copy_from_slice(b"000001");
    open_field(&mut fsdh.station, "FB");
    open_field(&mut fsdh.network, "XX");
    open_field(&mut fsdh.location, "");
    open_field(&mut fsdh.channel, "BHZ");
    fsdh.write(&mut raw, ByteOrder::Big)?;
    let frames = block.to_bytes();
    raw[64..64 + frames.len()].copy_from_slice(&frames);

    // default config falls back to Steim-1, big endian
    let rec = decode_record(&raw, 512, true, &CodecConfig::default())?;
    assert_eq!(rec.encoding, DataEncoding::STEIM1);
    assert_eq!(rec.byte_order, ByteOrder::Big);
    assert_eq!(rec.samples, Some(Samples::Int32(data)));

    // with the fallback disabled the record is rejected
    let strict = CodecConfig {
        unpack_data_format_fallback: None,
        ..CodecConfig::default()
    };
    assert!(matches!(
        decode_record(&raw, 512, true, &strict),
        Err(MSeedError::NoBlkt1000(_))
    ));
    Ok(())
}

#[test]
fn contiguous_records_assemble_into_one_segment() -> Result<(), MSeedError> {
    // records packed from one continuous series are contiguous on readback
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(1500);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM1, ByteOrder::Big);
    assert!(records.len() >= 2);
    let stream: Vec<u8> = records.concat();

    let traces = read_traces(
        &stream[..],
        ReaderConfig::default(),
        true,
        Tolerance::Default,
        Tolerance::Default,
    )?;
    assert_eq!(traces.len(), 1);
    let seg = &traces.segments()[0];
    assert_eq!(seg.sample_count, 1500);
    assert_eq!(seg.samples, Samples::Int32(data));
    assert_eq!(seg.start_time, start);
    let expected_end = start + ((1500 - 1) as f64 / 20.0 * HPTMODULUS as f64 + 0.5) as i64;
    assert_eq!(seg.end_time, expected_end);
    Ok(())
}

#[test]
fn pack_envelope_stream() -> Result<(), MSeedError> {
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(1000);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM2, ByteOrder::Big);

    // wrap the records in a PED container: 10-byte identifier, then per
    // data block an 8-byte info (trailing 8 digits = size), an 8-byte
    // checksum and the block itself
    let mut stream: Vec<u8> = Vec::new();
    stream.extend_from_slice(b"PED\0\0\0\0\0\0\0");
    let half = records.len() / 2;
    for chunk in [&records[..half], &records[half..]] {
        let block: Vec<u8> = chunk.concat();
        stream.extend_from_slice(format!("{:08}", block.len()).as_bytes());
        stream.extend_from_slice(b"CHECKSUM");
        stream.extend_from_slice(&block);
    }
    // zero length block terminates the stream
    stream.extend_from_slice(b"00000000");
    stream.extend_from_slice(b"CHECKSUM");

    let mut reader = Reader::new(&stream[..], ReaderConfig::default());
    let mut count = 0;
    let mut samples = 0;
    while let Some(rec) = reader.next_record()? {
        count += 1;
        samples += rec.decoded_sample_count();
    }
    assert_eq!(count, records.len());
    assert_eq!(samples, data.len());
    Ok(())
}

#[test]
fn skip_not_data_chunks() -> Result<(), MSeedError> {
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(600);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM2, ByteOrder::Big);
    let mut stream: Vec<u8> = records[0].clone();
    // a 512-byte non-data chunk in the middle
    let mut junk = vec![b'#'; 512];
    junk[0..8].copy_from_slice(b"notseed!");
    stream.extend_from_slice(&junk);
    for rec in &records[1..] {
        stream.extend_from_slice(rec);
    }

    let config = ReaderConfig {
        skip_not_data: true,
        ..ReaderConfig::default()
    };
    let mut reader = Reader::new(&stream[..], config);
    let mut count = 0;
    while let Some(_rec) = reader.next_record()? {
        count += 1;
    }
    assert_eq!(count, records.len());

    // without the flag the junk chunk is an error
    let mut strict = Reader::new(&stream[..], ReaderConfig::default());
    let mut result = Ok(None);
    for _ in 0..=records.len() {
        result = strict.next_record();
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(MSeedError::NotSeed(_))));
    Ok(())
}

#[test]
fn truncated_trailing_record() -> Result<(), MSeedError> {
    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(600);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM2, ByteOrder::Big);
    let mut stream: Vec<u8> = records.concat();
    stream.truncate(stream.len() - 100);

    let mut reader = Reader::new(&stream[..], ReaderConfig::default());
    let mut outcome = reader.next_record();
    while let Ok(Some(_)) = outcome {
        outcome = reader.next_record();
    }
    assert!(matches!(outcome, Err(MSeedError::Truncated(512, 412))));
    Ok(())
}

#[test]
fn sac_into_zip_archive() -> Result<(), MSeedError> {
    use chrono::TimeZone;

    let start = HpTime::parse_seed("2010,100,00:00:00")?;
    let data = sinusoid(800);
    let records = packed_records(start, 20.0, &data, 512, DataEncoding::STEIM2, ByteOrder::Big);
    let stream: Vec<u8> = records.concat();
    let traces = read_traces(
        &stream[..],
        ReaderConfig::default(),
        true,
        Tolerance::Default,
        Tolerance::Default,
    )?;

    let sac_config = sac::SacConfig {
        format: sac::SacFormat::BinaryBigEndian,
        ..sac::SacConfig::default()
    };
    let mut zs = zip::ZipStream::new(Vec::new());
    let modtime = chrono::Utc.with_ymd_and_hms(2013, 9, 28, 0, 0, 0).unwrap();
    for seg in traces.iter() {
        let mut body = Vec::new();
        let written = sac::write_sac(seg, &sac_config, &mut body)?;
        assert_eq!(written, seg.decoded_sample_count());
        assert_eq!(body.len(), sac::SAC_HEADER_LEN + 4 * written);
        let name = sac::unique_output_name(seg, &sac_config, |_| false)?;
        assert_eq!(name, "XX.TEST.00.BHZ.D.2010.100.000000.SAC");
        zs.write_entry(&name, modtime, zip::ZipMethod::Deflate, &body)?;
    }
    let out = zs.finish()?;

    // archive ends with a well formed end-of-central-directory record
    let eocd = out.len() - 22;
    assert_eq!(
        u32::from_le_bytes(out[eocd..eocd + 4].try_into().unwrap()),
        0x06054b50
    );
    assert_eq!(
        u16::from_le_bytes(out[eocd + 10..eocd + 12].try_into().unwrap()),
        traces.len() as u16
    );
    Ok(())
}

#[test]
fn segment_pack_round_trip() -> Result<(), MSeedError> {
    // assemble from records, repack the segment, read the repacked stream
    let start = HpTime::parse_seed("2011,032,08:15:00")?;
    let data = sinusoid(2100);
    let records = packed_records(start, 40.0, &data, 512, DataEncoding::STEIM1, ByteOrder::Big);
    let stream: Vec<u8> = records.concat();
    let mut traces = read_traces(
        &stream[..],
        ReaderConfig::default(),
        true,
        Tolerance::Default,
        Tolerance::Default,
    )?;

    let mut sink: Vec<Vec<u8>> = Vec::new();
    let config = CodecConfig::default();
    let result = traces.pack(
        &mut sink,
        4096,
        DataEncoding::STEIM2,
        ByteOrder::Big,
        true,
        &config,
    )?;
    assert_eq!(result.sample_count, 2100);
    assert!(traces.segments()[0].samples.is_empty());

    let restream: Vec<u8> = sink.concat();
    let back = read_traces(
        &restream[..],
        ReaderConfig::default(),
        true,
        Tolerance::Default,
        Tolerance::Default,
    )?;
    assert_eq!(back.len(), 1);
    assert_eq!(back.segments()[0].samples, Samples::Int32(data));
    assert_eq!(back.segments()[0].start_time, start);
    Ok(())
}
