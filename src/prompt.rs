//! Instruction sent with every counting request

/// Fixed prompt for the single generation call; the model receives the
/// original photo first and the right-side sprite second
pub const ANALYZER_PROMPT: &str = r#"
Você é uma IA especializada em leitura de ábacos físicos usados em inspeção industrial.

Você receberá duas imagens:
(1) Ábaco original (contexto).
(2) SPRITE com 10 recortes, de cima para baixo (linhas 1..10), cada recorte contém APENAS o LADO DIREITO do observador,
   já ampliado e nitidado para facilitar a contagem.

Regras:
- Leia SEMPRE do ponto de vista do observador: a contagem válida é a das bolinhas à DIREITA.
- Leia as linhas de CIMA para BAIXO (topo → base) e mapeie assim:
  1: aerosaculite
  2: celulite
  3: contusao
  4: hematomas
  5: hepatite
  6: micoplasmose
  7: pericardite
  8: peritonite
  9: salmonelose
  10: tuberculose

Procedimento por linha:
1) Conte DIRETA e explicitamente no sprite quantas bolinhas estão à DIREITA.
2) (Checagem) Opcional: usando o original, conte à ESQUERDA e verifique se direita == 10 - esquerda.
3) Se houver dúvida, recalcule até coincidir. Use apenas inteiros 0..10.

Retorne SOMENTE JSON (sem texto extra), exatamente neste formato:
{
  "linhas": [
    {"linha": 1, "avaria": "aerosaculite", "direita": <int>},
    {"linha": 2, "avaria": "celulite", "direita": <int>},
    {"linha": 3, "avaria": "contusao", "direita": <int>},
    {"linha": 4, "avaria": "hematomas", "direita": <int>},
    {"linha": 5, "avaria": "hepatite", "direita": <int>},
    {"linha": 6, "avaria": "micoplasmose", "direita": <int>},
    {"linha": 7, "avaria": "pericardite", "direita": <int>},
    {"linha": 8, "avaria": "peritonite", "direita": <int>},
    {"linha": 9, "avaria": "salmonelose", "direita": <int>},
    {"linha": 10, "avaria": "tuberculose", "direita": <int>}
  ],
  "contagem": {
    "aerosaculite": <int>,
    "celulite": <int>,
    "contusao": <int>,
    "hematomas": <int>,
    "hepatite": <int>,
    "micoplasmose": <int>,
    "pericardite": <int>,
    "peritonite": <int>,
    "salmonelose": <int>,
    "tuberculose": <int>
  }
}
"#;
