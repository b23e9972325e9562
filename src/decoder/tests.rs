use super::*;
    use crate::encoder::{encode, encode_with_schema};
    use crate::options::Preserve;
    use crate::schema::{ComplexTypeDef, Particle, SchemaModel};

    fn doc(body: Vec<ExiEvent>) -> Vec<ExiEvent> {
        let mut events = vec![ExiEvent::StartDocument];
        events.extend(body);
        events.push(ExiEvent::EndDocument);
        events
    }

    fn sample() -> Vec<ExiEvent> {
        doc(vec![
            ExiEvent::start_element("", "r"),
            ExiEvent::attribute("", "k", "v"),
            ExiEvent::start_element("", "a"),
            ExiEvent::characters("eins"),
            ExiEvent::EndElement,
            ExiEvent::start_element("", "a"),
            ExiEvent::characters("zwei"),
            ExiEvent::EndElement,
            ExiEvent::EndElement,
        ])
    }

    fn round_trip(events: &[ExiEvent], options: &ExiOptions) -> Vec<ExiEvent> {
        let bytes = encode(events, options).unwrap();
        decode(&bytes).unwrap().0
    }

    // ========================================================================
    // Schritt 1: Header
    // ========================================================================

    #[test]
    fn falsche_distinguishing_bits() {
        let err = ExiDecoder::new(vec![0x00]).process_header().err().unwrap();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn leere_eingabe() {
        assert!(ExiDecoder::new(Vec::new()).process_header().is_err());
    }

    /// Ohne Options im Header gelten die uebergebenen Defaults.
    #[test]
    fn options_aus_defaults() {
        let options = ExiOptions::default().without_header_options().with_alignment(Alignment::PreCompression);
        let bytes = encode(&sample(), &options).unwrap();
        let (events, opts) = decode_with_options(&bytes, options.clone()).unwrap();
        assert_eq!(events, sample());
        assert_eq!(opts.alignment(), Alignment::PreCompression);
    }

    #[test]
    fn header_options_gewinnen() {
        let options = ExiOptions::default().with_alignment(Alignment::ByteAlignment);
        let bytes = encode(&sample(), &options).unwrap();
        let scanner = ExiDecoder::new(bytes).with_options(ExiOptions::default()).process_header().unwrap();
        assert_eq!(scanner.options().alignment(), Alignment::ByteAlignment);
        assert_eq!(scanner.header().schema_informed, Some(false));
    }

    #[test]
    fn schema_informed_ohne_schema() {
        let mut b = SchemaModel::builder();
        let string = b.builtin("string");
        b.global_element(QName::new("", "a"), string);
        let schema: Arc<dyn SchemaQuery> = Arc::new(b.build().unwrap());
        let events = doc(vec![ExiEvent::start_element("", "a"), ExiEvent::EndElement]);
        let bytes = encode_with_schema(&events, schema, &ExiOptions::default()).unwrap();
        let err = ExiDecoder::new(bytes).process_header().err().unwrap();
        assert!(matches!(err, Error::UnsupportedOption(_)));
    }

    // ========================================================================
    // Schritt 2: Scanner
    // ========================================================================

    #[test]
    fn nach_ed_nur_none() {
        let bytes = encode(&sample(), &ExiOptions::default()).unwrap();
        let mut scanner = ExiDecoder::new(bytes).process_header().unwrap();
        while scanner.next_event().unwrap().is_some() {}
        assert_eq!(scanner.next_event().unwrap(), None);
        assert!(scanner.next().is_none());
    }

    /// Ein abgeschnittener Stream liefert genau einen Fehler.
    #[test]
    fn abgeschnittener_stream() {
        let mut bytes = encode(&sample(), &ExiOptions::default()).unwrap();
        bytes.truncate(bytes.len() - 4);
        let mut scanner = ExiDecoder::new(bytes).process_header().unwrap();
        let results: Vec<_> = scanner.by_ref().collect();
        assert!(results.last().unwrap().is_err());
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert!(scanner.next().is_none());
    }

    // ========================================================================
    // Schritt 3: Alignments und Bloecke
    // ========================================================================

    #[test]
    fn alle_alignments() {
        for alignment in
            [Alignment::BitPacked, Alignment::ByteAlignment, Alignment::PreCompression, Alignment::Compression]
        {
            let options = ExiOptions::default().with_alignment(alignment);
            assert_eq!(round_trip(&sample(), &options), sample(), "{alignment:?}");
        }
    }

    fn many(n: usize, channels: usize) -> Vec<ExiEvent> {
        let mut body = vec![ExiEvent::start_element("", "r")];
        for i in 0..n {
            let name = format!("c{}", i % channels);
            body.push(ExiEvent::start_element("", &name));
            body.push(ExiEvent::attribute("", "n", &i.to_string()));
            body.push(ExiEvent::characters(&format!("wert {}", i % 13)));
            body.push(ExiEvent::EndElement);
        }
        body.push(ExiEvent::EndElement);
        doc(body)
    }

    /// Kleine Bloecke: Grenzen fallen mitten in Start-Tags und Inhalte.
    #[test]
    fn blockgrenzen() {
        let events = many(40, 3);
        for size in [1, 2, 3, 7, 100] {
            for alignment in [Alignment::PreCompression, Alignment::Compression] {
                let options = ExiOptions::default().with_alignment(alignment).with_block_size(size);
                assert_eq!(round_trip(&events, &options), events, "{alignment:?} / {size}");
            }
        }
    }

    /// Mehr als 100 Values: Structure, kleine Channels und grosse Channels in
    /// eigenen Streams.
    #[test]
    fn grosse_channels_eigene_streams() {
        let mut body = vec![ExiEvent::start_element("", "r")];
        for i in 0..150 {
            body.push(ExiEvent::start_element("", "gross"));
            body.push(ExiEvent::characters(&i.to_string()));
            body.push(ExiEvent::EndElement);
        }
        body.push(ExiEvent::start_element("", "klein"));
        body.push(ExiEvent::characters("x"));
        body.push(ExiEvent::EndElement);
        body.push(ExiEvent::EndElement);
        let events = doc(body);
        let options = ExiOptions::default().with_alignment(Alignment::Compression);
        assert_eq!(round_trip(&events, &options), events);
    }

    // ========================================================================
    // Schritt 4: Fidelity
    // ========================================================================

    #[test]
    fn kommentare_und_pis() {
        let events = doc(vec![
            ExiEvent::Comment(Arc::from(" vorn ")),
            ExiEvent::start_element("", "r"),
            ExiEvent::ProcessingInstruction(PiContent { name: Arc::from("ziel"), text: Arc::from("daten") }),
            ExiEvent::characters("t"),
            ExiEvent::Comment(Arc::from("innen")),
            ExiEvent::EndElement,
        ]);
        let options = ExiOptions::default().with_preserve(Preserve { comments: true, pis: true, ..Preserve::default() });
        assert_eq!(round_trip(&events, &options), events);
    }

    #[test]
    fn prefixe_erhalten() {
        let events = doc(vec![
            ExiEvent::StartElement(Arc::new(QName::with_prefix("urn:a", "r", "p"))),
            ExiEvent::namespace("urn:a", "p", true),
            ExiEvent::EndElement,
        ]);
        let options = ExiOptions::default().with_preserve(Preserve { prefixes: true, ..Preserve::default() });
        let decoded = round_trip(&events, &options);
        assert_eq!(decoded, events);
        let ExiEvent::StartElement(q) = &decoded[1] else { panic!("SE erwartet") };
        assert_eq!(q.prefix.as_deref(), Some("p"));
    }

    /// Schema-informed mit typisierten Werten: kanonische Form kommt zurueck.
    #[test]
    fn typisierte_werte_kanonisch() {
        let mut b = SchemaModel::builder();
        let int = b.builtin("int");
        let n = b.element(QName::new("", "n"), int);
        let root = b.complex_type(None, ComplexTypeDef::element_only(Particle::element(n).repeated()));
        b.global_element(QName::new("", "root"), root);
        let schema: Arc<dyn SchemaQuery> = Arc::new(b.build().unwrap());

        let events = doc(vec![
            ExiEvent::start_element("", "root"),
            ExiEvent::start_element("", "n"),
            ExiEvent::characters("+007"),
            ExiEvent::EndElement,
            ExiEvent::EndElement,
        ]);
        let bytes = encode_with_schema(&events, Arc::clone(&schema), &ExiOptions::default()).unwrap();
        let (decoded, _) = decode_with_schema(&bytes, schema, ExiOptions::default()).unwrap();
        assert_eq!(decoded[3], ExiEvent::characters("7"));
    }

    /// SE ohne Prefix: der Prefix kommt aus dem NS-Event mit local-element-ns.
    #[test]
    fn se_prefix_aus_ns_event() {
        let events = doc(vec![
            ExiEvent::start_element("urn:a", "r"),
            ExiEvent::namespace("urn:a", "p", true),
            ExiEvent::EndElement,
        ]);
        let options = ExiOptions::default().with_preserve(Preserve { prefixes: true, ..Preserve::default() });
        let decoded = round_trip(&events, &options);
        let ExiEvent::StartElement(q) = &decoded[1] else { panic!("SE erwartet") };
        assert_eq!(q.prefix.as_deref(), Some("p"));
        assert_eq!(&*q.uri, "urn:a");
    }
