//! Built-in grammars (EXI 8.4).
//!
//! Elements without a schema declaration use a built-in element grammar with
//! the two states StartTagContent und ElementContent. Built-in grammars lernen:
//! wird ein Event ueber eine undeklarierte Production kodiert, bekommt der
//! Zustand eine neue Production der ersten Stufe mit Event Code 0, alle
//! anderen ruecken eins weiter (EXI 8.4.3).
//!
//! Der gelernte Zustand gehoert der Session. Der geteilte
//! [`crate::grammar::GrammarSet`] bleibt unveraendert.

use std::sync::Arc;

use crate::event_types::{CatalogKey, EventType, EventTypeList, GrammarRef};
use crate::grammar::{EventShape, Next, Production};
use crate::options::GrammarOptions;
use crate::qname::QName;
use crate::{Error, FastHashMap, Result};

/// StartTagContent
pub const START_TAG: usize = 0;
/// ElementContent
pub const CONTENT: usize = 1;

#[derive(Debug)]
struct ElementGrammar {
    qname: Arc<QName>,
    /// Learned productions per state, newest first.
    learned: [Vec<Production>; 2],
    catalogs: [Option<Arc<EventTypeList>>; 2],
}

/// Session-owned built-in grammars: one per element qname plus the
/// learning fragment grammar of schema-less streams.
#[derive(Debug)]
pub struct BuiltinGrammars {
    options: GrammarOptions,
    elements: Vec<ElementGrammar>,
    by_name: FastHashMap<QName, usize>,
    fragment: Vec<Production>,
    fragment_catalogs: [Option<Arc<EventTypeList>>; 2],
}

impl BuiltinGrammars {
    pub fn new(options: GrammarOptions) -> Self {
        Self {
            options,
            elements: Vec::new(),
            by_name: FastHashMap::default(),
            fragment: Vec::new(),
            fragment_catalogs: [None, None],
        }
    }

    /// Id of the grammar for `qname`, created on first use.
    pub fn element(&mut self, qname: &Arc<QName>) -> usize {
        if let Some(&id) = self.by_name.get(&**qname) {
            return id;
        }
        let id = self.elements.len();
        self.elements.push(ElementGrammar {
            qname: Arc::clone(qname),
            learned: [Vec::new(), Vec::new()],
            catalogs: [None, None],
        });
        self.by_name.insert(qname.expanded(), id);
        log::trace!("built-in grammar #{id} for {qname}");
        id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn qname(&self, id: usize) -> Option<&Arc<QName>> {
        self.elements.get(id).map(|e| &e.qname)
    }

    /// Current catalog of a built-in grammar or the learning fragment grammar.
    pub fn catalog(&mut self, grammar: GrammarRef, state: usize) -> Result<Arc<EventTypeList>> {
        let key = CatalogKey { grammar, state };
        let options = self.options;
        match grammar {
            GrammarRef::Builtin(id) => {
                let element = self.elements.get_mut(id).ok_or_else(|| missing(key))?;
                let slot = element.catalogs.get_mut(state).ok_or_else(|| missing(key))?;
                if let Some(list) = slot.as_ref() {
                    return Ok(Arc::clone(list));
                }
                let list = Arc::new(element_catalog(key, &element.learned[state], options));
                *slot = Some(Arc::clone(&list));
                Ok(list)
            }
            GrammarRef::Fragment => {
                let slot = self.fragment_catalogs.get_mut(state).ok_or_else(|| missing(key))?;
                if let Some(list) = slot.as_ref() {
                    return Ok(Arc::clone(list));
                }
                let list = Arc::new(fragment_catalog(key, &self.fragment, options));
                *slot = Some(Arc::clone(&list));
                Ok(list)
            }
            GrammarRef::Set(_) => Err(missing(key)),
        }
    }

    /// Learns from the entry that encoded (or decoded) an event.
    ///
    /// `qname` is the name the event carried for SE(*) and AT(*). Element
    /// grammars learn only from entries outside the first tier; the fragment
    /// grammar learns from every SE(*).
    pub fn learn(&mut self, used: &EventType, qname: Option<&Arc<QName>>) {
        let state = used.key.state;
        match used.key.grammar {
            GrammarRef::Builtin(_) if used.tier == 0 => {}
            GrammarRef::Builtin(id) => {
                let Some(element) = self.elements.get_mut(id) else { return };
                let learned = match (&used.shape, qname) {
                    (EventShape::StartElementWildcard, Some(q)) => {
                        Production::new(EventShape::StartElementNamed(Arc::clone(q)), Next::State(CONTENT))
                    }
                    (EventShape::AttributeWildcardAny, Some(q)) if state == START_TAG => Production::new(
                        EventShape::AttributeNamed { qname: Arc::clone(q), type_id: None },
                        Next::State(START_TAG),
                    ),
                    (EventShape::CharactersUntyped, _) => {
                        Production::new(EventShape::CharactersUntyped, Next::State(CONTENT))
                    }
                    (EventShape::EndElement, _) if state == START_TAG => {
                        Production::new(EventShape::EndElement, Next::End)
                    }
                    _ => return,
                };
                log::trace!("{} learns {} in state {state}", element.qname, learned.shape);
                if let Some(states) = element.learned.get_mut(state) {
                    states.insert(0, learned);
                    element.catalogs[state] = None;
                }
            }
            GrammarRef::Fragment => {
                if let (EventShape::StartElementWildcard, Some(q)) = (&used.shape, qname) {
                    log::trace!("fragment learns SE({q})");
                    self.fragment
                        .insert(0, Production::new(EventShape::StartElementNamed(Arc::clone(q)), Next::State(1)));
                    self.fragment_catalogs[1] = None;
                }
            }
            GrammarRef::Set(_) => {}
        }
    }
}

fn missing(key: CatalogKey) -> Error {
    Error::schema_inconsistency(format!("no built-in {key}"))
}

fn comments_and_pis(options: GrammarOptions, tier: &mut Vec<Production>) {
    if options.comments() {
        tier.push(Production::new(EventShape::Comment, Next::State(CONTENT)));
    }
    if options.pis() {
        tier.push(Production::new(EventShape::ProcessingInstruction, Next::State(CONTENT)));
    }
}

/// EXI 8.4.3
fn element_catalog(key: CatalogKey, learned: &[Production], options: GrammarOptions) -> EventTypeList {
    let mut tiers: [Vec<Production>; 3] = Default::default();
    tiers[0].extend(learned.iter().cloned());
    if key.state == START_TAG {
        let second = &mut tiers[1];
        second.push(Production::new(EventShape::EndElement, Next::End));
        second.push(Production::new(EventShape::AttributeWildcardAny, Next::State(START_TAG)));
        if options.prefixes() {
            second.push(Production::new(EventShape::NamespaceDecl, Next::State(START_TAG)));
        }
        if options.self_contained() {
            second.push(Production::new(EventShape::SelfContained, Next::State(START_TAG)));
        }
    } else {
        tiers[0].push(Production::new(EventShape::EndElement, Next::End));
    }
    let second = &mut tiers[1];
    second.push(Production::new(EventShape::StartElementWildcard, Next::State(CONTENT)));
    second.push(Production::new(EventShape::CharactersUntyped, Next::State(CONTENT)));
    if options.dtd() {
        second.push(Production::new(EventShape::EntityReference, Next::State(CONTENT)));
    }
    comments_and_pis(options, &mut tiers[2]);
    EventTypeList::from_tiers(key, tiers)
}

/// EXI 8.4.2, with SE(qname) learned ahead of SE(*).
fn fragment_catalog(key: CatalogKey, learned: &[Production], options: GrammarOptions) -> EventTypeList {
    let mut tiers: [Vec<Production>; 3] = Default::default();
    if key.state == 0 {
        tiers[0].push(Production::new(EventShape::StartDocument, Next::State(1)));
    } else {
        tiers[0].extend(learned.iter().cloned());
        tiers[0].push(Production::new(EventShape::StartElementWildcard, Next::State(1)));
        tiers[0].push(Production::new(EventShape::EndDocument, Next::End));
        if options.comments() {
            tiers[2].push(Production::new(EventShape::Comment, Next::State(1)));
        }
        if options.pis() {
            tiers[2].push(Production::new(EventShape::ProcessingInstruction, Next::State(1)));
        }
    }
    EventTypeList::from_tiers(key, tiers)
}
