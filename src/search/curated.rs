//! Curated fallback content.
//!
//! A hand-picked table of reference publications served through the same
//! [`SearchBackend`] contract as the live APIs. Enabled with `static` in
//! `SEARCH_BACKENDS`; the aggregator's URL dedup collapses the repeats
//! returned for every term.

use async_trait::async_trait;

use super::{RawHit, SearchBackend, SearchError};

struct CuratedEntry {
    category: &'static str,
    title: &'static str,
    origin: &'static str,
    year: Option<&'static str>,
    description: &'static str,
    url: &'static str,
}

const CURATED: &[CuratedEntry] = &[
    CuratedEntry {
        category: "Biotecnologia e Sangue Artificial",
        title: "Ensaios de Fase I com Vesículas de Hemoglobina",
        origin: "Japão",
        year: Some("2026"),
        description: "A Universidade Médica de Nara avançou com testes em humanos de um substituto de sangue universal. O produto é estável por 2 anos à temperatura ambiente e não requer compatibilidade de grupo sanguíneo.",
        url: "https://trial.medpath.com/news/6f9dac528c3e9037/japan-launches-world-s-first-clinical-trials-for-artificial-blood-in-2025",
    },
    CuratedEntry {
        category: "Biotecnologia e Sangue Artificial",
        title: "ErythroMer - Sangue Liofilizado",
        origin: "EUA",
        year: None,
        description: "Desenvolvimento de nanopartículas de hemoglobina em pó para ressuscitação de emergência em cenários de trauma onde o sangue doado não está disponível.",
        url: "https://www.medschool.umaryland.edu/news/2023/artificial-blood-product-one-step-closer-to-reality-with-46-million-in-federal-funding.html",
    },
    CuratedEntry {
        category: "Cirurgias de Alta Complexidade e PBM",
        title: "Transplante Coração-Fígado Sem Sangue",
        origin: "Tampa General Hospital",
        year: Some("2025"),
        description: "Documentação do sucesso do primeiro transplante simultâneo destes órgãos realizado inteiramente sem transfusão, utilizando técnicas agressivas de hemostasia de precisão e recuperação celular (Cell Saver).",
        url: "https://www.tgh.org/news/tgh-press-releases/2025/july/tgh-usf-health-successfully-perform-world-first-recorded-bloodless-heart-liver-transplant-surgery",
    },
    CuratedEntry {
        category: "Cirurgias de Alta Complexidade e PBM",
        title: "Transplante Cardíaco: Estudo Longitudinal",
        origin: "PubMed",
        year: None,
        description: "Revisão confirmando que pacientes que recusam sangue têm desfechos idênticos aos convencionais quando seguidos protocolos rigorosos de gestão de sangue.",
        url: "https://pubmed.ncbi.nlm.nih.gov/40935286/",
    },
    CuratedEntry {
        category: "Novas Diretrizes e Consensos",
        title: "Guia Global da OMS sobre Patient Blood Management",
        origin: "OMS",
        year: Some("2025"),
        description: "A OMS estabeleceu o PBM como padrão global de segurança, focando na otimização da hemoglobina própria e minimização de perdas iatrogénicas.",
        url: "https://www.who.int/publications/i/item/9789240104662",
    },
    CuratedEntry {
        category: "Novas Diretrizes e Consensos",
        title: "Escala VIBe na Gestão de Sangramento",
        origin: "HTCT Journal",
        year: None,
        description: "Publicação validando uma escala visual que ajuda cirurgiões a quantificar o sangramento em tempo real, otimizando o uso de selantes farmacológicos.",
        url: "https://www.htct.com.br/pt-when-innovation-meets-patient-blood-articulo-S2531137924003080",
    },
];

pub struct CuratedBackend {
    max_results: usize,
}

impl CuratedBackend {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }
}

#[async_trait]
impl SearchBackend for CuratedBackend {
    fn name(&self) -> &'static str {
        "Curated"
    }

    async fn search(&self, _term: &str) -> Result<Vec<RawHit>, SearchError> {
        Ok(CURATED
            .iter()
            .take(self.max_results)
            .map(|entry| RawHit {
                title: Some(entry.title.to_string()),
                url: entry.url.to_string(),
                snippet: Some(format!("[{}] {}", entry.category, entry.description)),
                authors: Some(entry.origin.to_string()),
                year: entry.year.map(str::to_string),
                ..RawHit::default()
            })
            .collect())
    }
}
